use std::sync::atomic::AtomicBool;

use jpegcarve_core::{
    BlockSource, CarveConfig, ExtractError, ImageSink, MemorySource, ScanSummary, SectorScanner,
    SegmentWalker, Stitcher, plan_partitions,
};
use proptest::prelude::*;

fn segment(code: u8, payload: &[u8]) -> Vec<u8> {
    let declared = u16::try_from(payload.len() + 2).unwrap();
    let mut bytes = vec![0xFF, code];
    bytes.extend_from_slice(&declared.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Escapes every 0xFF in `data` the way an encoder stuffs entropy-coded bytes.
fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for &byte in data {
        out.push(byte);
        if byte == 0xFF {
            out.push(0x00);
        }
    }
    out
}

fn create_jpeg(scan: &[u8]) -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend(segment(0xE0, b"JFIF\x00\x01\x01\x00\x00\x01\x00\x01\x00\x00"));
    jpeg.extend(segment(0xDB, &[0x01; 65]));
    jpeg.extend(segment(0xC0, &[0x08, 0x00, 0x10, 0x00, 0x10, 0x01, 0x01, 0x11, 0x00]));
    jpeg.extend(segment(0xC4, &[0x00; 29]));
    jpeg.extend(segment(0xDA, &[0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]));
    jpeg.extend(stuff(scan));
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

fn create_garbage(size: usize, seed: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = u32::from(seed);
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

fn place(disk: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    if disk.len() < offset + bytes.len() {
        disk.resize(offset + bytes.len(), 0);
    }
    disk[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[derive(Default)]
struct CollectingSink {
    images: Vec<(u32, u64, Vec<u8>)>,
}

impl ImageSink for CollectingSink {
    fn store(&mut self, index: u32, source_offset: u64, bytes: &[u8]) -> jpegcarve_core::Result<String> {
        self.images.push((index, source_offset, bytes.to_vec()));
        Ok(format!("image{index:05}.jpg"))
    }
}

fn scan_sequential(disk: &[u8], scanner: &SectorScanner) -> (ScanSummary, Vec<(u32, u64, Vec<u8>)>) {
    let mut source = MemorySource::new(disk.to_vec());
    let mut sink = CollectingSink::default();
    let summary = scanner
        .scan(&mut source, &mut sink, &mut (), &AtomicBool::new(false))
        .unwrap();
    (summary, sink.images)
}

fn scan_stitched(
    disk: &[u8],
    scanner: &SectorScanner,
    span: u64,
) -> (ScanSummary, Vec<(u32, u64, Vec<u8>)>) {
    let cancel = AtomicBool::new(false);
    let mut source = MemorySource::new(disk.to_vec());
    let bound = scanner.bound(&source);
    let mut sink = CollectingSink::default();

    let mut stitcher = Stitcher::new(scanner, bound);
    for partition in plan_partitions(bound, scanner.config().sector_size, span) {
        let outcome = scanner.scan_partition(&mut source, partition, &mut (), &cancel);
        stitcher
            .absorb(&mut source, outcome, &mut sink, &mut (), &cancel)
            .unwrap();
    }
    (stitcher.finish(), sink.images)
}

/// Garbage whose sectors never start with an SOI by accident.
fn garbage_disk(size: usize, sector: usize) -> Vec<u8> {
    let mut disk = create_garbage(size, 7);
    for start in (0..size).step_by(sector) {
        disk[start] = 0x00;
    }
    disk
}

#[test]
fn test_recovers_images_from_garbage() {
    let first = create_jpeg(&create_garbage(3000, 1));
    let second = create_jpeg(&create_garbage(200, 2));
    let third = create_jpeg(&[]);

    let mut disk = garbage_disk(64 * 1024, 512);
    place(&mut disk, 4096, &first);
    place(&mut disk, 20 * 512, &second);
    place(&mut disk, 100 * 512, &third);

    let scanner = SectorScanner::new(CarveConfig::default()).unwrap();
    let (summary, images) = scan_sequential(&disk, &scanner);

    assert_eq!(summary.recovered(), 3);
    assert_eq!(summary.bytes_scanned, 64 * 1024);
    assert_eq!(images[0], (0, 4096, first));
    assert_eq!(images[1], (1, 20 * 512, second));
    assert_eq!(images[2], (2, 100 * 512, third));
}

#[test]
fn test_image_filling_whole_sectors() {
    let mut scan = Vec::new();
    let base = create_jpeg(&[]).len();
    scan.resize(1024 - base, 0x42);
    let exact = create_jpeg(&scan);
    assert_eq!(exact.len(), 1024);

    let follower = create_jpeg(&[0x01, 0x02]);
    let mut disk = vec![0u8; 4096];
    place(&mut disk, 0, &exact);
    place(&mut disk, 1024, &follower);

    let scanner = SectorScanner::new(CarveConfig::default()).unwrap();
    let (summary, images) = scan_sequential(&disk, &scanner);
    assert_eq!(summary.recovered(), 2);
    assert_eq!(images[1].1, 1024);
}

#[test]
fn test_large_sector_size() {
    let image = create_jpeg(&create_garbage(5000, 3));
    let mut disk = vec![0u8; 64 * 1024];
    place(&mut disk, 8192, &image);
    // Sits on a 512-byte boundary but not on a 4096-byte one.
    place(&mut disk, 33 * 512, &create_jpeg(&[0x01]));

    let scanner = SectorScanner::new(CarveConfig::default().with_sector_size(4096)).unwrap();
    let (summary, images) = scan_sequential(&disk, &scanner);
    assert_eq!(summary.recovered(), 1);
    assert_eq!(images[0].2, image);
}

#[test]
fn test_oversized_image_is_dropped() {
    let big = create_jpeg(&create_garbage(20_000, 4));
    let small = create_jpeg(&[0x10; 100]);
    let mut disk = vec![0u8; 64 * 1024];
    place(&mut disk, 0, &big);
    place(&mut disk, 48 * 1024, &small);

    let config = CarveConfig::default().with_max_image_size(8 * 1024);
    let scanner = SectorScanner::new(config).unwrap();
    let (summary, images) = scan_sequential(&disk, &scanner);

    assert_eq!(summary.failed_candidates, 1);
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].1, 48 * 1024);
}

#[test]
fn test_parallel_matches_sequential_on_garbage_disk() {
    let mut disk = garbage_disk(256 * 1024, 512);
    for (i, offset) in [0usize, 7, 19, 64, 65, 200, 300, 480].into_iter().enumerate() {
        let image = create_jpeg(&create_garbage(300 + i * 900, i as u8));
        place(&mut disk, offset * 512, &image);
    }
    disk.truncate(256 * 1024);

    let scanner = SectorScanner::new(CarveConfig::default()).unwrap();
    let expected = scan_sequential(&disk, &scanner);
    for span in [512, 4096, 10_000, 64 * 1024, 1 << 20] {
        assert_eq!(scan_stitched(&disk, &scanner, span), expected, "span {span}");
    }
}

/// Bytes drawn mostly from marker-significant values.
fn markerish_bytes(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![
            4 => Just(0xFFu8),
            2 => Just(0xD8u8),
            1 => Just(0xD9u8),
            1 => Just(0xDAu8),
            1 => Just(0x00u8),
            1 => Just(0xD0u8),
            1 => Just(0x01u8),
            3 => any::<u8>(),
        ],
        0..max_len,
    )
}

proptest! {
    #[test]
    fn extraction_never_exceeds_bound(tail in markerish_bytes(2048), max in 4usize..512, chunk in 1usize..64) {
        let mut data = vec![0xFF, 0xD8];
        data.extend(tail);
        let walker = SegmentWalker::new(
            &CarveConfig::default().with_max_image_size(max).with_scan_chunk_size(chunk),
        );
        let mut source = MemorySource::new(data.clone());

        match walker.extract(&mut source, 0, &AtomicBool::new(false)) {
            Ok(bytes) => {
                prop_assert!(bytes.len() <= max);
                prop_assert!(bytes.ends_with(&[0xFF, 0xD9]));
                prop_assert_eq!(&bytes[..], &data[..bytes.len()]);
            }
            Err(ExtractError::Cancelled { .. }) => prop_assert!(false, "not cancelled"),
            Err(err) => prop_assert!(err.offset() <= data.len() as u64),
        }
    }

    #[test]
    fn valid_image_survives_any_chunk_size(scan in prop::collection::vec(any::<u8>(), 0..4096), chunk in 1usize..10_001) {
        let image = create_jpeg(&scan);
        let mut data = image.clone();
        data.extend_from_slice(&[0x00, 0xFF, 0xD8, 0xAA]);

        let walker = SegmentWalker::new(&CarveConfig::default().with_scan_chunk_size(chunk));
        let mut source = MemorySource::new(data);
        let bytes = walker.extract(&mut source, 0, &AtomicBool::new(false));
        prop_assert_eq!(bytes.ok(), Some(image));
    }

    #[test]
    fn stitched_scan_matches_sequential(disk in markerish_bytes(4096), sectors in 1u64..12, max in 4usize..600) {
        let config = CarveConfig::default()
            .with_sector_size(16)
            .with_max_image_size(max)
            .with_scan_chunk_size(7);
        let scanner = SectorScanner::new(config).unwrap();

        let expected = scan_sequential(&disk, &scanner);
        prop_assert_eq!(scan_stitched(&disk, &scanner, sectors * 16), expected);
    }

    #[test]
    fn scanner_cursor_respects_bound(disk in markerish_bytes(2048), limit in 0u64..3000) {
        let config = CarveConfig::default()
            .with_sector_size(32)
            .with_max_image_size(256)
            .with_scan_limit(Some(limit));
        let scanner = SectorScanner::new(config).unwrap();

        let (summary, images) = scan_sequential(&disk, &scanner);
        prop_assert_eq!(summary.bytes_scanned, limit.min(disk.len() as u64));
        for (index, (stored, offset, bytes)) in images.iter().enumerate() {
            prop_assert_eq!(*stored as usize, index);
            prop_assert!(offset % 32 == 0);
            prop_assert!(*offset < limit);
            prop_assert_eq!(&bytes[..], &disk[*offset as usize..*offset as usize + bytes.len()]);
        }
    }
}

#[test]
fn test_block_source_is_object_safe() {
    let mut boxed: Box<dyn BlockSource> = Box::new(MemorySource::new(vec![1, 2, 3]));
    let mut buffer = [0u8; 8];
    assert_eq!(boxed.read_chunk(1, &mut buffer).unwrap(), 2);
    assert_eq!(boxed.size(), 3);
}
