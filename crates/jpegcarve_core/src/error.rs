use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to store image {index}: {source}")]
    Sink {
        index: u32,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Reasons a single extraction attempt is abandoned.
///
/// None of these stop a scan; the scanner logs them and moves one sector on.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A marker was expected but the lead byte was not `0xFF`.
    #[error("incorrect marker {byte:#04x} at offset {offset}, stopping prematurely")]
    MalformedMarker { offset: u64, byte: u8 },

    /// `size` is either the declared segment length (when below 2) or the
    /// image size the next append would have reached.
    #[error("size {size} is out of bounds at offset {offset} (limit {limit})")]
    SizeBoundExceeded { offset: u64, size: u64, limit: usize },

    #[error("source exhausted at offset {offset}")]
    SourceExhausted { offset: u64 },

    #[error("read error at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: CoreError,
    },

    #[error("cancelled at offset {offset}")]
    Cancelled { offset: u64 },
}

impl ExtractError {
    /// Absolute source offset at which the attempt was abandoned.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        match self {
            Self::MalformedMarker { offset, .. }
            | Self::SizeBoundExceeded { offset, .. }
            | Self::SourceExhausted { offset }
            | Self::Read { offset, .. }
            | Self::Cancelled { offset } => *offset,
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Short, stable label used in logs and summaries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedMarker { .. } => "malformed-marker",
            Self::SizeBoundExceeded { .. } => "size-bound-exceeded",
            Self::SourceExhausted { .. } => "source-exhausted",
            Self::Read { .. } => "read-error",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
