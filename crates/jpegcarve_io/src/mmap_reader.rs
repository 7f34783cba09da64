use jpegcarve_core::{BlockSource, CoreError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Block source over a read-only memory map of an image file.
///
/// Clones share the mapping.
#[derive(Debug, Clone)]
pub struct MmapReader {
    mmap: Arc<Mmap>,
}

impl MmapReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        if file.metadata()?.len() == 0 {
            return Err(CoreError::InvalidFormat(format!(
                "cannot map empty file {}",
                path.display()
            )));
        }

        // SAFETY: the map is read-only. A concurrent writer truncating the
        // image is outside what a forensic read can guard against.
        let mmap = unsafe { Mmap::map(&file) }?;

        if mmap.is_empty() {
            return Err(CoreError::InvalidFormat(format!(
                "empty mapping for {} (block device?)",
                path.display()
            )));
        }

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Sequential);
        }

        debug!("mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(Self {
            mmap: Arc::new(mmap),
        })
    }

    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        if start >= self.mmap.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        Some(&self.mmap[start..end])
    }

    /// Asks the kernel to start paging in `[offset, offset + len)`.
    #[cfg(target_os = "linux")]
    pub fn prefetch(&self, offset: u64, len: usize) {
        let Ok(start) = usize::try_from(offset) else {
            return;
        };
        if start >= self.mmap.len() {
            return;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        let _ = self
            .mmap
            .advise_range(memmap2::Advice::WillNeed, start, end - start);
    }

    #[cfg(not(target_os = "linux"))]
    pub fn prefetch(&self, _offset: u64, _len: usize) {}
}

impl BlockSource for MmapReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        match self.slice(offset, buffer.len()) {
            Some(slice) => {
                buffer[..slice.len()].copy_from_slice(slice);
                Ok(slice.len())
            }
            None => Ok(0),
        }
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}
