#![no_main]

use jpegcarve_core::{CarveConfig, MemorySource, SegmentWalker};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::AtomicBool;

const MAX_IMAGE_SIZE: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, rest)) = data.split_first() else {
        return;
    };

    let mut bytes = vec![0xFF, 0xD8];
    bytes.extend_from_slice(rest);

    let config = CarveConfig::default()
        .with_max_image_size(MAX_IMAGE_SIZE)
        .with_scan_chunk_size(usize::from(chunk) + 1);
    let walker = SegmentWalker::new(&config);
    let mut source = MemorySource::new(bytes.clone());

    if let Ok(image) = walker.extract(&mut source, 0, &AtomicBool::new(false)) {
        assert!(image.len() <= MAX_IMAGE_SIZE);
        assert_eq!(&image[..], &bytes[..image.len()]);
        assert!(image.ends_with(&[0xFF, 0xD9]));
    }
});
