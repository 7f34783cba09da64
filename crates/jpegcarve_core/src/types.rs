use crate::error::ExtractError;

/// An image that was extracted and accepted by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredImage {
    pub index: u32,
    pub offset: u64,
    pub length: u64,
    pub artifact: String,
}

impl RecoveredImage {
    /// Offset of the first byte after the image.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// A signature hit whose extraction failed.
#[derive(Debug)]
pub struct FailedCandidate {
    pub offset: u64,
    pub reason: ExtractError,
}

impl FailedCandidate {
    /// Offset at which parsing gave up.
    #[inline]
    #[must_use]
    pub const fn abandoned_at(&self) -> u64 {
        self.reason.offset()
    }
}

/// Totals for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub images: Vec<RecoveredImage>,
    pub failed_candidates: u64,
    pub read_errors: u64,
    pub bytes_scanned: u64,
    pub cancelled: bool,
}

impl ScanSummary {
    /// Number of images recovered, which is also the next sequence index.
    #[inline]
    #[must_use]
    pub fn recovered(&self) -> u32 {
        self.images.len() as u32
    }

    #[must_use]
    pub fn recovered_bytes(&self) -> u64 {
        self.images.iter().map(|image| image.length).sum()
    }
}
