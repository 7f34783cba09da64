use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use jpegcarve_core::{
    ImageSink, Partition, PartitionOutcome, ScanObserver, ScanSummary, SectorScanner, Stitcher,
    plan_partitions,
};
use jpegcarve_io::Reader;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::progress::ProgressObserver;

const MAX_PARTITION_SPAN: u64 = 64 * 1024 * 1024;
const PARTITIONS_PER_WORKER: u64 = 4;
const CHANNEL_SLOTS_PER_WORKER: usize = 2;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Worker progress is published in steps of this many bytes.
const PROGRESS_STEP: u64 = 1024 * 1024;

pub type EngineResult<T> = anyhow::Result<T>;

/// `0` means one worker per CPU.
pub fn worker_count(jobs: usize) -> usize {
    if jobs == 0 { num_cpus::get() } else { jobs }
}

/// Sector-aligned partition size for `jobs` workers over `bound` bytes.
pub fn partition_span(bound: u64, sector_size: u64, jobs: usize) -> u64 {
    let target = bound / (jobs.max(1) as u64 * PARTITIONS_PER_WORKER);
    let span = target.min(MAX_PARTITION_SPAN).max(sector_size);
    span.div_ceil(sector_size) * sector_size
}

pub fn run_sequential(
    scanner: &SectorScanner,
    reader: &mut Reader,
    sink: &mut dyn ImageSink,
    progress: &mut ProgressObserver,
    cancel: &AtomicBool,
) -> EngineResult<ScanSummary> {
    Ok(scanner.scan(reader, sink, progress, cancel)?)
}

/// Scans with `jobs` worker threads and stitches their results in order.
///
/// Workers only record hits. The calling thread re-reads each adopted image
/// and is the only one that touches `sink`, so artifacts are written in the
/// same order, with the same indices, as a sequential scan.
pub fn run_parallel(
    scanner: &SectorScanner,
    reader: &Reader,
    jobs: usize,
    sink: &mut dyn ImageSink,
    progress: &mut ProgressObserver,
    cancel: &AtomicBool,
) -> EngineResult<ScanSummary> {
    let jobs = jobs.max(1);
    let bound = scanner.bound(reader);
    let sector_size = scanner.config().sector_size;
    let span = partition_span(bound, sector_size, jobs);
    let partitions = plan_partitions(bound, sector_size, span);
    info!(
        "scanning {} partition(s) of {span} bytes with {jobs} worker(s)",
        partitions.len()
    );

    let worker_sources = (0..jobs)
        .map(|_| reader.try_clone())
        .collect::<Result<Vec<_>, _>>()?;
    let mut stitch_source = reader.try_clone()?;
    let scanned = AtomicU64::new(0);

    thread::scope(|scope| -> EngineResult<ScanSummary> {
        let capacity = jobs * CHANNEL_SLOTS_PER_WORKER;
        let (job_tx, job_rx) = bounded::<Partition>(capacity);
        let (result_tx, result_rx) = bounded::<PartitionOutcome>(capacity);

        for (worker_id, source) in worker_sources.into_iter().enumerate() {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let scanned = &scanned;
            scope.spawn(move || {
                worker_thread(worker_id, scanner, source, job_rx, result_tx, scanned, cancel);
            });
        }
        drop(job_rx);
        drop(result_tx);

        // Every partition is queued even after cancellation; workers answer
        // those with an empty cancelled outcome, which ends the stitching.
        scope.spawn(move || {
            for partition in partitions {
                if job_tx.send(partition).is_err() {
                    break;
                }
            }
        });

        let mut stitcher = Stitcher::new(scanner, bound);
        let mut pending = BTreeMap::new();
        let mut next_index = 0;

        loop {
            match result_rx.recv_timeout(POLL_INTERVAL) {
                Ok(outcome) => {
                    pending.insert(outcome.partition.index, outcome);
                    while let Some(outcome) = pending.remove(&next_index) {
                        stitcher.absorb(&mut stitch_source, outcome, sink, progress, cancel)?;
                        next_index += 1;
                    }
                    if stitcher.is_cancelled() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            progress.advance_to(scanned.load(Ordering::Relaxed).max(stitcher.cursor()));
        }

        Ok(stitcher.finish())
    })
}

fn worker_thread(
    worker_id: usize,
    scanner: &SectorScanner,
    mut source: Reader,
    jobs: Receiver<Partition>,
    results: Sender<PartitionOutcome>,
    scanned: &AtomicU64,
    cancel: &AtomicBool,
) {
    for partition in jobs {
        let len = usize::try_from(partition.end - partition.start).unwrap_or(usize::MAX);
        source.prefetch(partition.start, len);

        let mut progress = WorkerProgress::new(scanned, partition.start);
        let outcome = scanner.scan_partition(&mut source, partition, &mut progress, cancel);
        progress.publish(partition.end);
        debug!(
            "worker {worker_id}: partition {} done, {} hit(s)",
            partition.index,
            outcome.hits.len()
        );

        if results.send(outcome).is_err() {
            break;
        }
    }
}

/// Adds the bytes one worker has passed to a shared counter.
struct WorkerProgress<'a> {
    scanned: &'a AtomicU64,
    published: u64,
}

impl<'a> WorkerProgress<'a> {
    fn new(scanned: &'a AtomicU64, start: u64) -> Self {
        Self {
            scanned,
            published: start,
        }
    }

    fn publish(&mut self, offset: u64) {
        if offset > self.published {
            self.scanned
                .fetch_add(offset - self.published, Ordering::Relaxed);
            self.published = offset;
        }
    }
}

impl ScanObserver for WorkerProgress<'_> {
    fn on_sector(&mut self, offset: u64) {
        if offset >= self.published + PROGRESS_STEP {
            self.publish(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jpegcarve_core::{CarveConfig, Result};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Default)]
    struct RecordingSink {
        stored: Vec<(u32, u64, Vec<u8>)>,
    }

    impl ImageSink for RecordingSink {
        fn store(&mut self, index: u32, source_offset: u64, bytes: &[u8]) -> Result<String> {
            self.stored.push((index, source_offset, bytes.to_vec()));
            Ok(format!("image{index:05}.jpg"))
        }
    }

    fn create_jpeg(fill: u8, scan_len: usize) -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        jpeg.extend_from_slice(b"JFIF\x00\x01\x01\x00\x00\x01\x00\x01\x00\x00");
        jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        for i in 0..scan_len {
            if i % 97 == 0 {
                jpeg.extend_from_slice(&[0xFF, 0x00]);
            } else {
                jpeg.push(fill);
            }
        }
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    fn disk_image() -> NamedTempFile {
        let mut disk = vec![0u8; 512 * 1024];
        let layout = [(0usize, 300usize), (3, 2000), (40, 9000), (62, 300), (64, 100), (700, 50_000)];
        for (i, (sector, scan_len)) in layout.into_iter().enumerate() {
            let image = create_jpeg(0x10 + i as u8, scan_len);
            let offset = sector * 512;
            disk[offset..offset + image.len()].copy_from_slice(&image);
        }
        // Candidate that fails: SOI followed by garbage.
        disk[900 * 512..900 * 512 + 3].copy_from_slice(&[0xFF, 0xD8, 0x42]);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&disk).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(3), 3);
        assert_eq!(worker_count(0), num_cpus::get());
    }

    #[test]
    fn test_partition_span() {
        assert_eq!(partition_span(1 << 40, 512, 8), MAX_PARTITION_SPAN);
        assert_eq!(partition_span(1000, 512, 4), 512);
        assert_eq!(partition_span(1 << 20, 512, 2), 128 * 1024);
        assert_eq!(partition_span(10_000, 4096, 1) % 4096, 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let file = disk_image();
        let scanner = SectorScanner::new(CarveConfig::default()).unwrap();
        let cancel = AtomicBool::new(false);

        let mut reader = Reader::open(file.path()).unwrap();
        let mut expected_sink = RecordingSink::default();
        let expected = run_sequential(
            &scanner,
            &mut reader,
            &mut expected_sink,
            &mut ProgressObserver::hidden(),
            &cancel,
        )
        .unwrap();
        assert_eq!(expected.recovered(), 6);
        assert_eq!(expected.failed_candidates, 1);

        for jobs in [2, 3, 8] {
            let mut sink = RecordingSink::default();
            let summary = run_parallel(
                &scanner,
                &reader,
                jobs,
                &mut sink,
                &mut ProgressObserver::hidden(),
                &cancel,
            )
            .unwrap();

            assert_eq!(summary, expected, "{jobs} workers");
            assert_eq!(sink.stored, expected_sink.stored, "{jobs} workers");
        }
    }

    #[test]
    fn test_parallel_scan_honours_cancellation() {
        let file = disk_image();
        let scanner = SectorScanner::new(CarveConfig::default()).unwrap();
        let reader = Reader::open(file.path()).unwrap();

        let mut sink = RecordingSink::default();
        let summary = run_parallel(
            &scanner,
            &reader,
            4,
            &mut sink,
            &mut ProgressObserver::hidden(),
            &AtomicBool::new(true),
        )
        .unwrap();

        assert!(summary.cancelled);
        assert!(sink.stored.is_empty());
    }

    #[test]
    fn test_parallel_on_empty_source() {
        let file = NamedTempFile::new().unwrap();
        let scanner = SectorScanner::new(CarveConfig::default()).unwrap();
        let reader = Reader::open(file.path()).unwrap();

        let summary = run_parallel(
            &scanner,
            &reader,
            2,
            &mut RecordingSink::default(),
            &mut ProgressObserver::hidden(),
            &AtomicBool::new(false),
        )
        .unwrap();
        assert_eq!(summary, ScanSummary::default());
    }
}
