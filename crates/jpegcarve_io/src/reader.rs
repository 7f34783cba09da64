//! Positional reader for block devices and image files.

use jpegcarve_core::{BlockSource, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// A read-only block source over a device node or disk image.
///
/// Reads are positional (`pread` on Unix), so the reader keeps no seek state
/// and [`DiskReader::try_clone`] gives every worker its own handle over the
/// same open file.
///
/// ```ignore
/// use jpegcarve_core::BlockSource;
/// use jpegcarve_io::DiskReader;
///
/// let mut reader = DiskReader::new("/dev/sdb")?;
/// let mut sector = vec![0u8; 512];
/// let read = reader.read_chunk(0, &mut sector)?;
/// ```
#[derive(Debug)]
pub struct DiskReader {
    file: File,
    size: u64,
}

impl DiskReader {
    /// Opens `path` read-only and records its size.
    ///
    /// Block devices report their size through `SEEK_END`, the same as files.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(false).open(path)?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{Advice, fadvise};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
            let _ = fadvise(&file, 0, None, Advice::NoReuse);
        }

        let size = file.seek(SeekFrom::End(0))?;
        debug!("opened {} for positional reads ({size} bytes)", path.display());

        Ok(Self { file, size })
    }

    /// Another handle on the same file, for a worker thread.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            size: self.size,
        })
    }
}

impl BlockSource for DiskReader {
    #[cfg(unix)]
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        use rustix::io::{Errno, pread};

        if offset >= self.size {
            return Ok(0);
        }
        loop {
            match pread(&self.file, &mut *buffer, offset) {
                Ok(read) => return Ok(read),
                Err(Errno::INTR) => continue,
                Err(errno) => return Err(std::io::Error::from(errno).into()),
            }
        }
    }

    #[cfg(not(unix))]
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        use std::io::Read;

        if offset >= self.size {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(self.file.read(buffer)?)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
