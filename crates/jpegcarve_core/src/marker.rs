//! JPEG marker codes and how the segment walker treats each of them.

pub const MARKER_PREFIX: u8 = 0xFF;
pub const STUFFED_ZERO: u8 = 0x00;

pub const SOI: [u8; 2] = [MARKER_PREFIX, 0xD8];
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const TEM: u8 = 0x01;
pub const FILL: u8 = 0xFF;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;

#[inline]
pub const fn is_restart_marker(code: u8) -> bool {
    code >= RST0 && code <= RST7
}

/// Markers that carry neither a length field nor a payload.
#[inline]
pub const fn is_lengthless_marker(code: u8) -> bool {
    is_restart_marker(code) || code == TEM || code == FILL
}

#[inline]
#[must_use]
pub fn is_soi(bytes: &[u8]) -> bool {
    bytes.starts_with(&SOI)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerClass {
    EndOfImage,
    Lengthless,
    /// Followed by a big-endian length that counts itself.
    Segment,
}

impl MarkerClass {
    #[inline]
    #[must_use]
    pub const fn of(code: u8) -> Self {
        match code {
            EOI => Self::EndOfImage,
            c if is_lengthless_marker(c) => Self::Lengthless,
            _ => Self::Segment,
        }
    }
}
