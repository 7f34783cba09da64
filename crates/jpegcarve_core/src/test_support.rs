//! Fixtures shared by the unit tests.

use crate::error::{CoreError, Result};
use crate::traits::{BlockSource, ImageSink, ScanObserver};
use crate::types::{FailedCandidate, RecoveredImage};
use crate::source::MemorySource;

/// A small baseline JPEG: SOI, APP0, SOS, `scan`, EOI.
pub fn jpeg(scan: &[u8]) -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    jpeg.extend_from_slice(b"JFIF\x00\x01\x01\x00\x00\x01\x00\x01\x00\x00");
    jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    jpeg.extend_from_slice(scan);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

/// SOI, one COM segment carrying `payload`, EOI. The payload starts at byte 6.
pub fn commented(payload: &[u8]) -> Vec<u8> {
    let declared = u16::try_from(payload.len() + 2).unwrap();
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xFE];
    jpeg.extend_from_slice(&declared.to_be_bytes());
    jpeg.extend_from_slice(payload);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

/// Copies `bytes` into `disk` at `offset`, growing it if needed.
pub fn place(disk: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    if disk.len() < offset + bytes.len() {
        disk.resize(offset + bytes.len(), 0);
    }
    disk[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[derive(Debug, Default)]
pub struct VecSink {
    pub stored: Vec<(u32, u64, Vec<u8>)>,
    pub fail_at: Option<u32>,
}

impl ImageSink for VecSink {
    fn store(&mut self, index: u32, source_offset: u64, bytes: &[u8]) -> Result<String> {
        if self.fail_at == Some(index) {
            return Err(CoreError::Sink {
                index,
                source: std::io::Error::other("disk full"),
            });
        }
        self.stored.push((index, source_offset, bytes.to_vec()));
        Ok(format!("image{index:05}.jpg"))
    }
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub sectors: Vec<u64>,
    pub recovered: Vec<u64>,
    pub failed: Vec<u64>,
}

impl ScanObserver for Recorder {
    fn on_sector(&mut self, offset: u64) {
        self.sectors.push(offset);
    }

    fn on_recovered(&mut self, image: &RecoveredImage) {
        self.recovered.push(image.offset);
    }

    fn on_failed(&mut self, candidate: &FailedCandidate) {
        self.failed.push(candidate.offset);
    }
}

/// Fails every read that starts inside `bad`.
pub struct FlakySource {
    pub inner: MemorySource,
    pub bad: std::ops::Range<u64>,
}

impl BlockSource for FlakySource {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        if self.bad.contains(&offset) {
            return Err(CoreError::Io(std::io::Error::other("bad sector")));
        }
        self.inner.read_chunk(offset, buffer)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}
