use humansize::{BINARY, format_size};
use indicatif::{ProgressBar, ProgressStyle};
use jpegcarve_core::{RecoveredImage, ScanObserver};

/// Bar position updates are batched to this many bytes.
const POSITION_INTERVAL: u64 = 1024 * 1024;

/// Console progress for a scan: bytes analysed and images recovered.
pub struct ProgressObserver {
    bar: ProgressBar,
    recovered: u64,
    position: u64,
    announce: bool,
}

impl ProgressObserver {
    /// A visible bar over `total` bytes that also prints one line per image.
    pub fn new(total: u64) -> anyhow::Result<Self> {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")?
                .progress_chars("##-"),
        );
        bar.set_message("Recovered files: 0");
        Ok(Self {
            bar,
            recovered: 0,
            position: 0,
            announce: true,
        })
    }

    /// Tracks counts without drawing anything.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            recovered: 0,
            position: 0,
            announce: false,
        }
    }

    /// Moves the bar forward to `bytes`. Never moves it back.
    pub fn advance_to(&mut self, bytes: u64) {
        if bytes >= self.position + POSITION_INTERVAL {
            self.position = bytes;
            self.bar.set_position(bytes);
        }
    }

    #[inline]
    pub fn recovered(&self) -> u64 {
        self.recovered
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ScanObserver for ProgressObserver {
    fn on_sector(&mut self, offset: u64) {
        self.advance_to(offset);
    }

    fn on_recovered(&mut self, image: &RecoveredImage) {
        self.recovered += 1;
        self.bar
            .set_message(format!("Recovered files: {}", self.recovered));
        if self.announce {
            self.bar.println(format!(
                "{} at offset {:#x} ({})",
                image.artifact,
                image.offset,
                format_size(image.length, BINARY)
            ));
        }
    }
}
