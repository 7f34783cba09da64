//! Parallel scanning support.
//!
//! A source is cut into sector-aligned partitions that workers scan
//! independently with [`SectorScanner::scan_partition`]. The [`Stitcher`]
//! then replays the sequential cursor over the outcomes in partition order.
//! Wherever that cursor lands on an offset a worker also visited, the two
//! paths agree from there on and the worker's results are adopted as they
//! are. Offsets the worker never visited (because a preceding image spilled
//! into the partition) are rescanned on the spot. The stitched result is
//! therefore identical to a sequential scan.

use std::sync::atomic::AtomicBool;

use tracing::{debug, warn};

use crate::error::Result;
use crate::scanner::SectorScanner;
use crate::source::read_span;
use crate::traits::{BlockSource, ImageSink, ScanObserver};
use crate::types::{FailedCandidate, ScanSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub start: u64,
    /// Exclusive. The cursor may overshoot it while inside an image.
    pub end: u64,
}

/// Splits `[0, bound)` into partitions of `span` bytes, rounded up to whole sectors.
#[must_use]
pub fn plan_partitions(bound: u64, sector_size: u64, span: u64) -> Vec<Partition> {
    let sector_size = sector_size.max(1);
    let span = span.max(1).div_ceil(sector_size) * sector_size;

    let mut partitions = Vec::with_capacity(bound.div_ceil(span) as usize);
    let mut start = 0;
    while start < bound {
        let end = start.saturating_add(span).min(bound);
        partitions.push(Partition {
            index: partitions.len(),
            start,
            end,
        });
        start = end;
    }
    partitions
}

/// A candidate that a worker extracted successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub offset: u64,
    pub length: u64,
    /// Cursor position after the hit.
    pub next: u64,
}

/// Everything a worker observed in one partition, in offset order.
#[derive(Debug)]
pub struct PartitionOutcome {
    pub partition: Partition,
    pub hits: Vec<Hit>,
    pub failures: Vec<FailedCandidate>,
    pub read_errors: Vec<u64>,
    pub cancelled: bool,
}

impl PartitionOutcome {
    #[must_use]
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            hits: Vec::new(),
            failures: Vec::new(),
            read_errors: Vec::new(),
            cancelled: false,
        }
    }

    /// True if the worker's cursor stopped at `offset`.
    ///
    /// Only meaningful for sector-aligned offsets.
    #[must_use]
    pub fn visited(&self, offset: u64) -> bool {
        if offset < self.partition.start || offset >= self.partition.end {
            return false;
        }
        let before = self.hits.partition_point(|hit| hit.offset < offset);
        match before.checked_sub(1) {
            Some(at) => offset >= self.hits[at].next,
            None => true,
        }
    }
}

/// Folds partition outcomes into one sequential scan result.
///
/// Outcomes must be absorbed in partition order.
#[derive(Debug)]
pub struct Stitcher<'a> {
    scanner: &'a SectorScanner,
    bound: u64,
    cursor: u64,
    summary: ScanSummary,
}

impl<'a> Stitcher<'a> {
    #[must_use]
    pub fn new(scanner: &'a SectorScanner, bound: u64) -> Self {
        Self {
            scanner,
            bound,
            cursor: 0,
            summary: ScanSummary::default(),
        }
    }

    /// Position of the sequential cursor so far.
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    #[inline]
    #[must_use]
    pub fn summary(&self) -> &ScanSummary {
        &self.summary
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.summary.cancelled
    }

    pub fn absorb(
        &mut self,
        source: &mut dyn BlockSource,
        outcome: PartitionOutcome,
        sink: &mut dyn ImageSink,
        observer: &mut dyn ScanObserver,
        cancel: &AtomicBool,
    ) -> Result<()> {
        if self.summary.cancelled {
            return Ok(());
        }
        if outcome.cancelled {
            self.summary.cancelled = true;
            return Ok(());
        }

        let partition = outcome.partition;
        let end = partition.end.min(self.bound);

        while self.cursor < end && !outcome.visited(self.cursor) {
            let step = self.scanner.step(
                source,
                self.cursor,
                sink,
                observer,
                &mut self.summary,
                cancel,
            )?;
            match step {
                Some(next) => self.cursor = next,
                None => {
                    if !self.summary.cancelled {
                        self.cursor = self.bound;
                    }
                    return Ok(());
                }
            }
        }
        if self.cursor >= end {
            return Ok(());
        }

        let joined = self.cursor;
        debug!(
            "partition {} joins the sequential path at offset {joined}",
            partition.index
        );

        let PartitionOutcome {
            hits,
            failures,
            read_errors,
            ..
        } = outcome;

        let mut resume = partition.end;
        for hit in hits.into_iter().filter(|hit| hit.offset >= joined) {
            self.adopt(source, hit, sink, observer)?;
            resume = resume.max(hit.next);
        }
        for candidate in failures.into_iter().filter(|c| c.offset >= joined) {
            self.scanner.reject(candidate, observer, &mut self.summary);
        }
        self.summary.read_errors += read_errors.iter().filter(|&&at| at >= joined).count() as u64;

        self.cursor = resume;
        Ok(())
    }

    fn adopt(
        &mut self,
        source: &mut dyn BlockSource,
        hit: Hit,
        sink: &mut dyn ImageSink,
        observer: &mut dyn ScanObserver,
    ) -> Result<()> {
        let bytes = match read_span(source, hit.offset, hit.length as usize) {
            Ok(bytes) if bytes.len() as u64 == hit.length => bytes,
            Ok(bytes) => {
                warn!(
                    "image at offset {} came back short on re-read ({} of {} bytes)",
                    hit.offset,
                    bytes.len(),
                    hit.length
                );
                self.summary.read_errors += 1;
                return Ok(());
            }
            Err(err) => {
                warn!("read error at offset {}: {err}", hit.offset);
                self.summary.read_errors += 1;
                return Ok(());
            }
        };
        self.scanner
            .emit(hit.offset, &bytes, sink, observer, &mut self.summary)
    }

    #[must_use]
    pub fn finish(self) -> ScanSummary {
        let mut summary = self.summary;
        summary.bytes_scanned = if summary.cancelled {
            self.cursor.min(self.bound)
        } else {
            self.bound
        };
        summary
    }
}
