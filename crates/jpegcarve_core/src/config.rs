//! Scan tunables.

use crate::error::{CoreError, Result};

pub const DEFAULT_SECTOR_SIZE: u64 = 512;
pub const DEFAULT_MAX_IMAGE_SIZE: usize = 6 * 1024 * 1024;
pub const DEFAULT_SCAN_CHUNK_SIZE: usize = 10_000;

/// Smallest image the walker can produce: SOI followed by EOI.
const MIN_IMAGE_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarveConfig {
    /// Stride between candidate offsets, and alignment of the cursor.
    pub sector_size: u64,
    /// Largest image the walker will accumulate before giving up.
    pub max_image_size: usize,
    /// Read size used while searching entropy-coded data for the next marker.
    pub scan_chunk_size: usize,
    /// Optional upper bound on candidate offsets, below the source size.
    pub scan_limit: Option<u64>,
}

impl Default for CarveConfig {
    fn default() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            scan_chunk_size: DEFAULT_SCAN_CHUNK_SIZE,
            scan_limit: None,
        }
    }
}

impl CarveConfig {
    #[must_use]
    pub fn with_sector_size(mut self, sector_size: u64) -> Self {
        self.sector_size = sector_size;
        self
    }

    #[must_use]
    pub fn with_max_image_size(mut self, max_image_size: usize) -> Self {
        self.max_image_size = max_image_size;
        self
    }

    #[must_use]
    pub fn with_scan_chunk_size(mut self, scan_chunk_size: usize) -> Self {
        self.scan_chunk_size = scan_chunk_size;
        self
    }

    #[must_use]
    pub fn with_scan_limit(mut self, scan_limit: Option<u64>) -> Self {
        self.scan_limit = scan_limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sector_size < 2 {
            return Err(CoreError::InvalidConfig(format!(
                "sector size must be at least 2 bytes, got {}",
                self.sector_size
            )));
        }
        if self.max_image_size < MIN_IMAGE_SIZE {
            return Err(CoreError::InvalidConfig(format!(
                "maximum image size must be at least {MIN_IMAGE_SIZE} bytes, got {}",
                self.max_image_size
            )));
        }
        if self.scan_chunk_size == 0 {
            return Err(CoreError::InvalidConfig(
                "scan chunk size must not be zero".into(),
            ));
        }
        Ok(())
    }

    /// Rounds `length` up to a whole number of sectors.
    #[inline]
    #[must_use]
    pub const fn round_to_sector(&self, length: u64) -> u64 {
        length.div_ceil(self.sector_size) * self.sector_size
    }

    /// Last offset (exclusive) the scanner tests on a source of `source_size` bytes.
    #[inline]
    #[must_use]
    pub fn upper_bound(&self, source_size: u64) -> u64 {
        self.scan_limit
            .map_or(source_size, |limit| limit.min(source_size))
    }
}

/// Parses a byte count with an optional `k`, `m` or `g` suffix (powers of 1024).
///
/// ```
/// use jpegcarve_core::parse_size;
///
/// assert_eq!(parse_size("512").unwrap(), 512);
/// assert_eq!(parse_size("6m").unwrap(), 6 * 1024 * 1024);
/// ```
pub fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let (digits, multiplier) = match text.char_indices().last() {
        Some((at, 'k' | 'K')) => (&text[..at], 1024),
        Some((at, 'm' | 'M')) => (&text[..at], 1024 * 1024),
        Some((at, 'g' | 'G')) => (&text[..at], 1024 * 1024 * 1024),
        _ => (text, 1),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| CoreError::InvalidConfig(format!("invalid size: {text:?}")))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| CoreError::InvalidConfig(format!("size overflows: {text:?}")))
}
