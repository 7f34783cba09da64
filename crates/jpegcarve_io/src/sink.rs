//! Writes recovered images into an output directory.

use jpegcarve_core::{CoreError, ImageSink, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores image `n` as `image<n>.jpg` (five digits, zero padded) in one directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Uses `dir` as the output directory, creating it if needed.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn file_name(index: u32) -> String {
        format!("image{index:05}.jpg")
    }

    #[must_use]
    pub fn path_for(&self, index: u32) -> PathBuf {
        self.dir.join(Self::file_name(index))
    }
}

impl ImageSink for DirectorySink {
    fn store(&mut self, index: u32, _source_offset: u64, bytes: &[u8]) -> Result<String> {
        let name = Self::file_name(index);
        let path = self.dir.join(&name);

        let write = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(&path)?);
            writer.write_all(bytes)?;
            writer.flush()
        };
        write().map_err(|source| CoreError::Sink { index, source })?;

        debug!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(name)
    }
}
