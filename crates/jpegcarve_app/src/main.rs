//! jpegcarve - recovers JPEG images from raw block devices and disk images.
//!
//! The device is scanned sector by sector. Every sector that starts with a
//! JPEG Start Of Image marker is followed segment by segment up to its End
//! Of Image, and the bytes in between are written out as one picture.

mod custody;
mod engine;
mod progress;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use humansize::{BINARY, format_size};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{Level, info};

use custody::CustodySink;
use jpegcarve_core::{CarveConfig, ImageSink, ScanSummary, SectorScanner, parse_size};
use jpegcarve_io::{DirectorySink, Reader};
use progress::ProgressObserver;

#[derive(Parser, Debug)]
#[command(name = "jpegcarve")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device or disk image to scan
    device: PathBuf,

    /// Directory that receives the recovered pictures
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Sector size; candidates are only tested on these boundaries
    #[arg(short, long, value_name = "BYTES", default_value = "512", value_parser = parse_bytes)]
    block_size: u64,

    /// Largest picture to recover (accepts k, m and g suffixes)
    #[arg(short, long, value_name = "BYTES", default_value = "6m", value_parser = parse_bytes)]
    max_size: u64,

    /// Read size used while looking for the end of scan data
    #[arg(short, long, value_name = "BYTES", default_value = "10000", value_parser = parse_bytes)]
    chunk_size: u64,

    /// Stop scanning at this offset
    #[arg(short, long, value_name = "BYTES", value_parser = parse_bytes)]
    limit: Option<u64>,

    /// Worker threads; 0 uses one per CPU
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Write a chain-of-custody JSON file next to every picture
    #[arg(long, default_value_t = false)]
    custody: bool,

    /// Only report errors, without a progress bar
    #[arg(short, long, default_value_t = false, conflicts_with = "verbose")]
    quiet: bool,

    /// Log details instead of drawing a progress bar (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_bytes(text: &str) -> std::result::Result<u64, String> {
    parse_size(text).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let scanner = SectorScanner::new(build_config(&args)?).context("Invalid scan settings")?;

    let mut reader = Reader::open(&args.device)
        .with_context(|| format!("Failed to open device: {}", args.device.display()))?;
    let bound = scanner.bound(&reader);
    info!(
        "{}: {} to scan{}",
        args.device.display(),
        format_size(bound, BINARY),
        if reader.is_mmap() { " (memory mapped)" } else { "" }
    );

    let directory = DirectorySink::create(&args.output)
        .with_context(|| format!("Failed to create output directory: {}", args.output.display()))?;
    let mut sink: Box<dyn ImageSink> = if args.custody {
        Box::new(CustodySink::new(directory, &args.output))
    } else {
        Box::new(directory)
    };

    let mut progress = if args.quiet || args.verbose > 0 {
        ProgressObserver::hidden()
    } else {
        ProgressObserver::new(bound)?
    };

    let jobs = engine::worker_count(args.jobs);
    let started = Instant::now();
    let summary = if jobs > 1 {
        engine::run_parallel(&scanner, &reader, jobs, sink.as_mut(), &mut progress, &cancelled)
    } else {
        engine::run_sequential(&scanner, &mut reader, sink.as_mut(), &mut progress, &cancelled)
    };
    progress.finish();
    let summary = summary.context("Scan aborted")?;

    print_summary(&summary, started.elapsed(), &args);
    Ok(())
}

fn build_config(args: &Args) -> Result<CarveConfig> {
    let max_image_size = usize::try_from(args.max_size).context("--max-size is too large")?;
    let scan_chunk_size = usize::try_from(args.chunk_size).context("--chunk-size is too large")?;

    Ok(CarveConfig::default()
        .with_sector_size(args.block_size)
        .with_max_image_size(max_image_size)
        .with_scan_chunk_size(scan_chunk_size)
        .with_scan_limit(args.limit))
}

fn init_logging(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(summary: &ScanSummary, elapsed: Duration, args: &Args) {
    if summary.cancelled {
        println!(
            "Scan interrupted after {}",
            format_size(summary.bytes_scanned, BINARY)
        );
    }

    println!("Restored {} picture(s)", summary.recovered());
    if args.quiet {
        return;
    }

    println!(
        "Scanned {} in {:.1}s, {} recovered into {}",
        format_size(summary.bytes_scanned, BINARY),
        elapsed.as_secs_f64(),
        format_size(summary.recovered_bytes(), BINARY),
        args.output.display()
    );
    if summary.failed_candidates > 0 {
        println!(
            "{} candidate(s) did not parse and were skipped",
            summary.failed_candidates
        );
    }
    if summary.read_errors > 0 {
        println!("{} unreadable sector(s) skipped", summary.read_errors);
    }
}
