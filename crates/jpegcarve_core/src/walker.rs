//! Segment walker: rebuilds the exact byte span of one JPEG from its SOI.
//!
//! The walker reads marker by marker. Length-bearing segments are copied
//! whole; after a Start Of Scan the entropy-coded data is searched for the
//! next `0xFF` that is not followed by a stuffed `0x00`. Every byte read is
//! appended, in order, so a successful result is always the contiguous
//! source range `[offset, offset + len)`.

use std::sync::atomic::{AtomicBool, Ordering};

use memchr::memchr;
use tracing::trace;

use crate::config::CarveConfig;
use crate::error::ExtractError;
use crate::marker::{self, MARKER_PREFIX, MarkerClass, SOS, STUFFED_ZERO};
use crate::source::fill_at;
use crate::traits::BlockSource;

/// Cap on the up-front reservation, for users who raise the size bound a lot.
const MAX_RESERVE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SegmentWalker {
    max_image_size: usize,
    scan_chunk_size: usize,
}

impl SegmentWalker {
    #[must_use]
    pub fn new(config: &CarveConfig) -> Self {
        Self {
            max_image_size: config.max_image_size,
            scan_chunk_size: config.scan_chunk_size.max(1),
        }
    }

    /// Extracts the image whose SOI marker sits at `offset`.
    ///
    /// `cancel` is polled at every entropy-scan chunk boundary.
    pub fn extract(
        &self,
        source: &mut dyn BlockSource,
        offset: u64,
        cancel: &AtomicBool,
    ) -> Result<Vec<u8>, ExtractError> {
        let mut walk = Walk {
            source,
            start: offset,
            pos: offset,
            out: Vec::with_capacity(self.max_image_size.min(MAX_RESERVE)),
            limit: self.max_image_size,
            chunk_size: self.scan_chunk_size,
            cancel,
            in_scan_data: false,
        };
        walk.run()?;
        Ok(walk.out)
    }
}

/// State of one extraction attempt.
struct Walk<'a> {
    source: &'a mut dyn BlockSource,
    start: u64,
    /// Next source offset to read; equals `start + out.len()` between steps.
    pos: u64,
    out: Vec<u8>,
    limit: usize,
    chunk_size: usize,
    cancel: &'a AtomicBool,
    in_scan_data: bool,
}

impl Walk<'_> {
    fn run(&mut self) -> Result<(), ExtractError> {
        let soi = self.read_pair()?;
        if !marker::is_soi(&soi) {
            let (offset, byte) = if soi[0] == MARKER_PREFIX {
                (self.start + 1, soi[1])
            } else {
                (self.start, soi[0])
            };
            return Err(ExtractError::MalformedMarker { offset, byte });
        }
        append_bounded(&mut self.out, &soi, self.limit, self.start)?;
        trace!("candidate jpeg found at offset {}", self.start);

        loop {
            let at = self.pos;
            let [lead, code] = self.read_pair()?;
            if lead != MARKER_PREFIX {
                return Err(ExtractError::MalformedMarker {
                    offset: at,
                    byte: lead,
                });
            }
            append_bounded(&mut self.out, &[lead, code], self.limit, self.start)?;

            match MarkerClass::of(code) {
                MarkerClass::EndOfImage => {
                    trace!("found end of image after {} bytes", self.out.len());
                    return Ok(());
                }
                MarkerClass::Lengthless => {
                    // RSTn separates intervals of one scan; it does not end scan data.
                    if self.in_scan_data && marker::is_restart_marker(code) {
                        trace!("restart marker {code:02x} at offset {at}");
                        self.scan_entropy_data()?;
                    } else {
                        trace!("found lengthless section {code:02x}");
                        self.in_scan_data = false;
                    }
                }
                MarkerClass::Segment => {
                    self.in_scan_data = false;
                    let length_bytes = self.read_pair()?;
                    append_bounded(&mut self.out, &length_bytes, self.limit, self.start)?;

                    let length = u16::from_be_bytes(length_bytes);
                    trace!("found section {code:02x} of len {length}");
                    if length < 2 {
                        return Err(ExtractError::SizeBoundExceeded {
                            offset: at,
                            size: u64::from(length),
                            limit: self.limit,
                        });
                    }

                    self.read_payload(usize::from(length) - 2)?;

                    if code == SOS {
                        self.in_scan_data = true;
                        self.scan_entropy_data()?;
                    }
                }
            }
        }
    }

    fn read_pair(&mut self) -> Result<[u8; 2], ExtractError> {
        let offset = self.pos;
        let mut pair = [0u8; 2];
        let got = fill_at(&mut *self.source, offset, &mut pair)
            .map_err(|source| ExtractError::Read { offset, source })?;
        if got < pair.len() {
            return Err(ExtractError::SourceExhausted {
                offset: offset + got as u64,
            });
        }
        self.pos += 2;
        Ok(pair)
    }

    /// Reads `len` payload bytes straight into the output buffer.
    fn read_payload(&mut self, len: usize) -> Result<(), ExtractError> {
        let offset = self.pos;
        let have = self.out.len();
        ensure_room(have, len, self.limit, self.start)?;
        reserve_bounded(&mut self.out, len, self.limit);

        self.out.resize(have + len, 0);
        let got = match fill_at(&mut *self.source, offset, &mut self.out[have..]) {
            Ok(got) => got,
            Err(source) => {
                self.out.truncate(have);
                return Err(ExtractError::Read { offset, source });
            }
        };
        if got < len {
            self.out.truncate(have + got);
            return Err(ExtractError::SourceExhausted {
                offset: offset + got as u64,
            });
        }

        self.pos += len as u64;
        Ok(())
    }

    /// Copies entropy-coded data up to the next real marker.
    ///
    /// On return the read position sits on that marker's `0xFF`.
    fn scan_entropy_data(&mut self) -> Result<(), ExtractError> {
        trace!("looking for end marker from offset {}", self.pos);

        let mut chunk = Vec::with_capacity(self.chunk_size + 1);
        let mut pending: Option<u8> = None;

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(ExtractError::Cancelled { offset: self.pos });
            }

            chunk.clear();
            chunk.extend(pending.take());
            let carried = chunk.len();
            chunk.resize(carried + self.chunk_size, 0);

            let offset = self.pos;
            let got = fill_at(&mut *self.source, offset, &mut chunk[carried..])
                .map_err(|source| ExtractError::Read { offset, source })?;
            if got == 0 {
                return Err(ExtractError::SourceExhausted { offset });
            }
            chunk.truncate(carried + got);
            self.pos += got as u64;

            let mut rest = &chunk[..];
            loop {
                match memchr(MARKER_PREFIX, rest) {
                    None => {
                        append_bounded(&mut self.out, rest, self.limit, self.start)?;
                        break;
                    }
                    Some(at) if at + 1 == rest.len() => {
                        append_bounded(&mut self.out, &rest[..at], self.limit, self.start)?;
                        pending = Some(MARKER_PREFIX);
                        break;
                    }
                    Some(at) if rest[at + 1] == STUFFED_ZERO => {
                        append_bounded(&mut self.out, &rest[..at + 2], self.limit, self.start)?;
                        rest = &rest[at + 2..];
                    }
                    Some(at) => {
                        append_bounded(&mut self.out, &rest[..at], self.limit, self.start)?;
                        self.pos = self.start + self.out.len() as u64;
                        trace!("found section end marker at offset {}", self.pos);
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[inline]
fn ensure_room(have: usize, extra: usize, limit: usize, start: u64) -> Result<(), ExtractError> {
    let size = have.saturating_add(extra);
    if size > limit {
        return Err(ExtractError::SizeBoundExceeded {
            offset: start + have as u64,
            size: size as u64,
            limit,
        });
    }
    Ok(())
}

/// Appends `bytes` unless that would take `out` past `limit`.
#[inline]
fn append_bounded(
    out: &mut Vec<u8>,
    bytes: &[u8],
    limit: usize,
    start: u64,
) -> Result<(), ExtractError> {
    ensure_room(out.len(), bytes.len(), limit, start)?;
    reserve_bounded(out, bytes.len(), limit);
    out.extend_from_slice(bytes);
    Ok(())
}

/// Grows `out` for `extra` more bytes without letting its capacity pass `limit`.
///
/// Callers have already checked that `out.len() + extra <= limit`.
#[inline]
fn reserve_bounded(out: &mut Vec<u8>, extra: usize, limit: usize) {
    let have = out.len();
    if out.capacity() - have < extra {
        let grow = extra.max(out.capacity()).min(limit - have);
        out.reserve_exact(grow);
    }
}
