//! Sector scanner: tests every sector boundary for an SOI signature and
//! hands hits to the segment walker.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::CarveConfig;
use crate::error::{CoreError, ExtractError, Result};
use crate::marker;
use crate::partition::{Hit, Partition, PartitionOutcome};
use crate::source::fill_at;
use crate::traits::{BlockSource, ImageSink, ScanObserver};
use crate::types::{FailedCandidate, RecoveredImage, ScanSummary};
use crate::walker::SegmentWalker;

/// What the scanner found at one candidate offset.
enum Probe {
    /// Fewer than two bytes remain.
    End,
    NoSignature,
    Unreadable(CoreError),
    Image(Vec<u8>),
    Failed(ExtractError),
}

#[derive(Debug, Clone)]
pub struct SectorScanner {
    config: CarveConfig,
    walker: SegmentWalker,
}

impl SectorScanner {
    pub fn new(config: CarveConfig) -> Result<Self> {
        config.validate()?;
        let walker = SegmentWalker::new(&config);
        Ok(Self { config, walker })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &CarveConfig {
        &self.config
    }

    /// Exclusive upper bound on candidate offsets for `source`.
    #[inline]
    #[must_use]
    pub fn bound(&self, source: &dyn BlockSource) -> u64 {
        self.config.upper_bound(source.size())
    }

    /// Scans `source` from offset zero, storing every recovered image in `sink`.
    ///
    /// Only a sink failure aborts the scan. Read errors and failed candidates
    /// are counted in the summary. If `cancel` becomes true the scan stops at
    /// the next stride and the summary is returned with `cancelled` set.
    pub fn scan(
        &self,
        source: &mut dyn BlockSource,
        sink: &mut dyn ImageSink,
        observer: &mut dyn ScanObserver,
        cancel: &AtomicBool,
    ) -> Result<ScanSummary> {
        let bound = self.bound(source);
        info!(
            "scanning {bound} bytes in {}-byte sectors",
            self.config.sector_size
        );

        let mut summary = ScanSummary::default();
        let mut cursor = 0;
        while cursor < bound {
            match self.step(source, cursor, sink, observer, &mut summary, cancel)? {
                Some(next) => cursor = next,
                None => break,
            }
        }

        summary.bytes_scanned = if summary.cancelled { cursor } else { bound };
        info!(
            "scan finished: {} image(s), {} failed candidate(s), {} read error(s)",
            summary.recovered(),
            summary.failed_candidates,
            summary.read_errors
        );
        Ok(summary)
    }

    /// Tests one candidate offset and returns where the cursor goes next.
    ///
    /// `None` means the scan is over, either because the source ran out or
    /// because it was cancelled (in which case `summary.cancelled` is set).
    pub(crate) fn step(
        &self,
        source: &mut dyn BlockSource,
        cursor: u64,
        sink: &mut dyn ImageSink,
        observer: &mut dyn ScanObserver,
        summary: &mut ScanSummary,
        cancel: &AtomicBool,
    ) -> Result<Option<u64>> {
        if cancel.load(Ordering::Relaxed) {
            summary.cancelled = true;
            return Ok(None);
        }

        let sector = self.config.sector_size;
        observer.on_sector(cursor);

        match self.probe(source, cursor, cancel) {
            Probe::End => Ok(None),
            Probe::NoSignature => Ok(Some(cursor + sector)),
            Probe::Unreadable(err) => {
                warn!("read error at offset {cursor}: {err}");
                summary.read_errors += 1;
                Ok(Some(cursor + sector))
            }
            Probe::Image(bytes) => {
                let length = bytes.len() as u64;
                self.emit(cursor, &bytes, sink, observer, summary)?;
                Ok(Some(cursor + self.config.round_to_sector(length)))
            }
            Probe::Failed(reason) if reason.is_cancelled() => {
                summary.cancelled = true;
                Ok(None)
            }
            Probe::Failed(reason) => {
                self.reject(FailedCandidate { offset: cursor, reason }, observer, summary);
                Ok(Some(cursor + sector))
            }
        }
    }

    /// Scans one partition without storing anything.
    ///
    /// The cursor starts at `partition.start` and stops at the first offset at
    /// or past `partition.end`. Hits are recorded with the cursor position that
    /// follows them, so a later pass can splice the outcome into a sequential
    /// scan.
    pub fn scan_partition(
        &self,
        source: &mut dyn BlockSource,
        partition: Partition,
        observer: &mut dyn ScanObserver,
        cancel: &AtomicBool,
    ) -> PartitionOutcome {
        let sector = self.config.sector_size;
        let mut outcome = PartitionOutcome::new(partition);
        let mut cursor = partition.start;

        while cursor < partition.end {
            if cancel.load(Ordering::Relaxed) {
                outcome.cancelled = true;
                break;
            }
            observer.on_sector(cursor);

            match self.probe(source, cursor, cancel) {
                Probe::End => break,
                Probe::NoSignature => cursor += sector,
                Probe::Unreadable(err) => {
                    warn!("read error at offset {cursor}: {err}");
                    outcome.read_errors.push(cursor);
                    cursor += sector;
                }
                Probe::Image(bytes) => {
                    let length = bytes.len() as u64;
                    let next = cursor + self.config.round_to_sector(length);
                    debug!("partition {}: image at offset {cursor}, {length} bytes", partition.index);
                    outcome.hits.push(Hit {
                        offset: cursor,
                        length,
                        next,
                    });
                    cursor = next;
                }
                Probe::Failed(reason) if reason.is_cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                Probe::Failed(reason) => {
                    debug!("candidate at offset {cursor} failed: {reason}");
                    outcome.failures.push(FailedCandidate {
                        offset: cursor,
                        reason,
                    });
                    cursor += sector;
                }
            }
        }

        outcome
    }

    fn probe(&self, source: &mut dyn BlockSource, offset: u64, cancel: &AtomicBool) -> Probe {
        let mut signature = [0u8; 2];
        match fill_at(source, offset, &mut signature) {
            Ok(got) if got < signature.len() => Probe::End,
            Ok(_) if !marker::is_soi(&signature) => Probe::NoSignature,
            Ok(_) => match self.walker.extract(source, offset, cancel) {
                Ok(bytes) => Probe::Image(bytes),
                Err(reason) => Probe::Failed(reason),
            },
            Err(err) => Probe::Unreadable(err),
        }
    }

    /// Hands a complete image to the sink and records it.
    pub(crate) fn emit(
        &self,
        offset: u64,
        bytes: &[u8],
        sink: &mut dyn ImageSink,
        observer: &mut dyn ScanObserver,
        summary: &mut ScanSummary,
    ) -> Result<()> {
        let index = summary.recovered();
        let artifact = sink.store(index, offset, bytes)?;
        let image = RecoveredImage {
            index,
            offset,
            length: bytes.len() as u64,
            artifact,
        };

        info!(
            "restored {} ({} bytes) from offset {offset}",
            image.artifact, image.length
        );
        observer.on_recovered(&image);
        summary.images.push(image);
        Ok(())
    }

    pub(crate) fn reject(
        &self,
        candidate: FailedCandidate,
        observer: &mut dyn ScanObserver,
        summary: &mut ScanSummary,
    ) {
        debug!(
            "candidate at offset {} failed ({}): {}",
            candidate.offset,
            candidate.reason.kind(),
            candidate.reason
        );
        summary.failed_candidates += 1;
        observer.on_failed(&candidate);
    }
}
