//! Chain-of-custody records written next to every recovered image.

use chrono::Utc;
use jpegcarve_core::{CoreError, ImageSink, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct ChainOfCustody {
    filename: String,
    source_offset: String,
    source_offset_decimal: u64,
    file_size: u64,
    sha256_hash: String,
    recovery_timestamp: String,
}

/// Wraps a sink and writes `<artifact>.custody.json` for each stored image.
pub struct CustodySink<S> {
    inner: S,
    dir: PathBuf,
}

impl<S: ImageSink> CustodySink<S> {
    /// `dir` must be where `inner` puts its artifacts.
    pub fn new(inner: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }
}

impl<S: ImageSink> ImageSink for CustodySink<S> {
    fn store(&mut self, index: u32, source_offset: u64, bytes: &[u8]) -> Result<String> {
        let artifact = self.inner.store(index, source_offset, bytes)?;
        write_chain_of_custody(&self.dir, &artifact, source_offset, bytes)
            .map_err(|source| CoreError::Sink { index, source })?;
        Ok(artifact)
    }
}

fn sidecar_path(dir: &Path, artifact: &str) -> PathBuf {
    dir.join(format!("{artifact}.custody.json"))
}

fn write_chain_of_custody(
    dir: &Path,
    artifact: &str,
    source_offset: u64,
    bytes: &[u8],
) -> std::io::Result<()> {
    let custody = ChainOfCustody {
        filename: artifact.to_string(),
        source_offset: format!("0x{source_offset:016X}"),
        source_offset_decimal: source_offset,
        file_size: bytes.len() as u64,
        sha256_hash: compute_sha256(bytes),
        recovery_timestamp: Utc::now().to_rfc3339(),
    };

    let json = serde_json::to_string_pretty(&custody).map_err(std::io::Error::other)?;
    fs::write(sidecar_path(dir, artifact), json)
}

fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jpegcarve_io::DirectorySink;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            compute_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_custody_sidecar_contents() {
        let temp_dir = TempDir::new().unwrap();
        let directory = DirectorySink::create(temp_dir.path()).unwrap();
        let mut sink = CustodySink::new(directory, temp_dir.path());

        let image = [0xFF, 0xD8, 0xFF, 0xD9];
        let artifact = sink.store(0, 0x1_0000, &image).unwrap();
        assert_eq!(artifact, "image00000.jpg");

        let json = fs::read_to_string(temp_dir.path().join("image00000.jpg.custody.json")).unwrap();
        let record: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(record["filename"], "image00000.jpg");
        assert_eq!(record["source_offset"], "0x0000000000010000");
        assert_eq!(record["source_offset_decimal"], 65536);
        assert_eq!(record["file_size"], 4);
        assert_eq!(record["sha256_hash"], compute_sha256(&image));
        assert!(record["recovery_timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_inner_failure_skips_sidecar() {
        struct Full;

        impl ImageSink for Full {
            fn store(&mut self, index: u32, _: u64, _: &[u8]) -> Result<String> {
                Err(CoreError::Sink {
                    index,
                    source: std::io::Error::other("disk full"),
                })
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let mut sink = CustodySink::new(Full, temp_dir.path());
        assert!(sink.store(0, 0, &[0xFF, 0xD8, 0xFF, 0xD9]).is_err());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
