use crate::error::Result;
use crate::traits::BlockSource;

/// Reads into `buffer` until it is full or the source ends.
///
/// `read_chunk` may legitimately return short counts (block devices often
/// do), so callers that need an exact number of bytes go through here.
/// Returns the number of bytes actually filled.
pub fn fill_at(source: &mut dyn BlockSource, offset: u64, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = source.read_chunk(offset + filled as u64, &mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Reads `length` bytes starting at `offset`, stopping early at end of source.
pub fn read_span(source: &mut dyn BlockSource, offset: u64, length: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    let filled = fill_at(source, offset, &mut bytes)?;
    bytes.truncate(filled);
    Ok(bytes)
}

/// A byte source held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        if start >= self.data.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.data.len());
        Some(&self.data[start..end])
    }
}

impl BlockSource for MemorySource {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        if let Some(slice) = self.slice(offset, buffer.len()) {
            let len = slice.len();
            buffer[..len].copy_from_slice(slice);
            Ok(len)
        } else {
            Ok(0)
        }
    }

    #[inline]
    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
