//! Core traits defining the interfaces for byte sources, image sinks and
//! scan observers.
//!
//! These traits follow the Ports & Adapters pattern so the carving engine
//! never touches files, devices or terminals directly.

use crate::error::Result;
use crate::types::{FailedCandidate, RecoveredImage};

/// A source of raw block data, typically a disk or image file.
///
/// Reads are positional: the caller always says where to read, so several
/// independent cursors (the sector scanner, the segment walker) can share one
/// source without a hidden seek position between them.
///
/// # Example
///
/// ```ignore
/// struct DiskDevice { /* ... */ }
///
/// impl BlockSource for DiskDevice {
///     fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
///         // Read from physical disk at offset
///     }
///
///     fn size(&self) -> u64 {
///         // Return total size in bytes
///     }
/// }
/// ```
pub trait BlockSource {
    /// Reads a chunk of data from the source at the specified offset.
    ///
    /// # Arguments
    ///
    /// * `offset` - The byte offset to start reading from
    /// * `buffer` - The buffer to read data into
    ///
    /// # Returns
    ///
    /// The number of bytes actually read, which may be less than `buffer.len()`
    /// if the end of the source is reached. Zero means end of source.
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the total size of the source in bytes.
    fn size(&self) -> u64;
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        (**self).read_chunk(offset, buffer)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

/// Destination for recovered images.
///
/// The sink decides how an artifact is named and persisted. It only ever
/// receives complete images, in increasing `index` order starting at zero.
pub trait ImageSink {
    /// Persists one recovered image.
    ///
    /// # Arguments
    ///
    /// * `index` - Zero-based sequence number, incremented only on success
    /// * `source_offset` - Offset of the image's SOI marker in the source
    /// * `bytes` - The complete image, SOI through EOI
    ///
    /// # Returns
    ///
    /// The artifact name assigned to the image (for example a file name).
    fn store(&mut self, index: u32, source_offset: u64, bytes: &[u8]) -> Result<String>;
}

/// Receives scan events as they happen.
///
/// Every method has an empty default, so observers implement only what they
/// need. `()` is the no-op observer.
pub trait ScanObserver {
    /// Called once for every candidate offset the scanner tests.
    fn on_sector(&mut self, _offset: u64) {}

    /// Called after an image has been handed to the sink.
    fn on_recovered(&mut self, _image: &RecoveredImage) {}

    /// Called when a signature hit failed to parse.
    fn on_failed(&mut self, _candidate: &FailedCandidate) {}
}

impl ScanObserver for () {}
