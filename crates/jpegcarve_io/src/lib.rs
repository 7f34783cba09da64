mod mmap_reader;
mod reader;
mod sink;

pub use mmap_reader::MmapReader;
pub use reader::DiskReader;
pub use sink::DirectorySink;

use jpegcarve_core::{BlockSource, Result};
use std::path::Path;
use tracing::debug;

/// A source opened from a path, mapped when possible.
#[derive(Debug)]
pub enum Reader {
    Mmap(MmapReader),
    Disk(DiskReader),
}

impl Reader {
    /// Maps regular files and falls back to positional reads for block
    /// devices, empty files and anything else `mmap` refuses.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match MmapReader::new(path) {
            Ok(reader) => Ok(Reader::Mmap(reader)),
            Err(err) => {
                debug!("not mapping {}: {err}", path.display());
                Ok(Reader::Disk(DiskReader::new(path)?))
            }
        }
    }

    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self, Reader::Mmap(_))
    }

    /// An independent handle for another thread.
    pub fn try_clone(&self) -> Result<Self> {
        match self {
            Reader::Mmap(reader) => Ok(Reader::Mmap(reader.clone())),
            Reader::Disk(reader) => Ok(Reader::Disk(reader.try_clone()?)),
        }
    }

    /// Read-ahead hint for a range a worker is about to scan.
    pub fn prefetch(&self, offset: u64, len: usize) {
        if let Reader::Mmap(reader) = self {
            reader.prefetch(offset, len);
        }
    }
}

impl BlockSource for Reader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        match self {
            Reader::Mmap(r) => r.read_chunk(offset, buffer),
            Reader::Disk(r) => r.read_chunk(offset, buffer),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Reader::Mmap(r) => r.size(),
            Reader::Disk(r) => r.size(),
        }
    }
}
