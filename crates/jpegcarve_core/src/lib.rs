pub mod config;
mod error;
pub mod marker;
pub mod partition;
pub mod scanner;
mod source;
mod traits;
mod types;
pub mod walker;

#[cfg(test)]
mod test_support;

pub use config::{CarveConfig, parse_size};
pub use error::{CoreError, ExtractError, Result};
pub use partition::{Hit, Partition, PartitionOutcome, Stitcher, plan_partitions};
pub use scanner::SectorScanner;
pub use source::{MemorySource, fill_at, read_span};
pub use traits::{BlockSource, ImageSink, ScanObserver};
pub use types::{FailedCandidate, RecoveredImage, ScanSummary};
pub use walker::SegmentWalker;
