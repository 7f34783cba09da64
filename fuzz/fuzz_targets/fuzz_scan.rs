#![no_main]

use jpegcarve_core::{
    CarveConfig, ImageSink, MemorySource, Result, SectorScanner, Stitcher, plan_partitions,
};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::AtomicBool;

#[derive(Default)]
struct Collect(Vec<(u32, u64, usize)>);

impl ImageSink for Collect {
    fn store(&mut self, index: u32, source_offset: u64, bytes: &[u8]) -> Result<String> {
        self.0.push((index, source_offset, bytes.len()));
        Ok(String::new())
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&span, disk)) = data.split_first() else {
        return;
    };

    let config = CarveConfig::default()
        .with_sector_size(16)
        .with_max_image_size(4096)
        .with_scan_chunk_size(13);
    let Ok(scanner) = SectorScanner::new(config) else {
        return;
    };
    let cancel = AtomicBool::new(false);
    let mut source = MemorySource::new(disk.to_vec());

    let mut sequential = Collect::default();
    let Ok(expected) = scanner.scan(&mut source, &mut sequential, &mut (), &cancel) else {
        return;
    };

    let bound = scanner.bound(&source);
    let mut stitched = Collect::default();
    let mut stitcher = Stitcher::new(&scanner, bound);
    for partition in plan_partitions(bound, 16, (u64::from(span) + 1) * 16) {
        let outcome = scanner.scan_partition(&mut source, partition, &mut (), &cancel);
        if stitcher
            .absorb(&mut source, outcome, &mut stitched, &mut (), &cancel)
            .is_err()
        {
            return;
        }
    }

    assert_eq!(stitcher.finish(), expected);
    assert_eq!(stitched.0, sequential.0);
});
