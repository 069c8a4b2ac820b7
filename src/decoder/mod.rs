//! Byte stream → raw vendor events.
//!
//! Two decoders share the [`FrameDecoder`] contract:
//! - [`MultipartDecoder`] for conformant `multipart/mixed` HTTP responses.
//! - [`RawFrameScanner`] for devices whose framing a conformant parser cannot read; it scans for
//!   the alert document itself and ignores everything around it.
//!
//! Decoders are fed chunks split at arbitrary points and buffer incrementally. A decoder lives
//! exactly as long as one connection; whatever is still buffered when the connection ends is
//! discarded, never emitted.

mod multipart;
mod raw;

pub use multipart::{parse_boundary, MultipartDecoder};
pub use raw::RawFrameScanner;

use crate::error::{FrameError, StreamError};
use crate::event::RawEvent;
use crate::registry::TransportMode;

/// Result of decoding a single frame. Frame errors are reported, not fatal.
pub type DecodedFrame = Result<RawEvent, FrameError>;

/// Incremental decoder for one connection's byte stream.
pub trait FrameDecoder: Send + std::fmt::Debug {
    /// Consume the next chunk and return every frame it completed.
    ///
    /// `Err` is a stream-level protocol error: the camera cannot be decoded at all.
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<DecodedFrame>, StreamError>;

    /// Bytes held while waiting for the rest of a frame.
    fn buffered(&self) -> usize;
}

/// Limits shared by both decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderLimits {
    /// Largest single frame accepted; larger ones are skipped.
    pub max_frame_bytes: usize,
    /// Raw socket only: bytes tolerated without a single recognisable frame before the framing is
    /// declared unparseable.
    pub raw_scan_limit: usize,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self { max_frame_bytes: 64 * 1024, raw_scan_limit: 256 * 1024 }
    }
}

/// Pick the decoder for a freshly opened connection.
///
/// Multipart streams must advertise `multipart/mixed` with a boundary; anything else is
/// [`StreamError::Unsupported`].
pub fn for_connection(
    mode: TransportMode,
    content_type: Option<&str>,
    limits: DecoderLimits,
) -> Result<Box<dyn FrameDecoder>, StreamError> {
    match mode {
        TransportMode::MultipartHttp => {
            let content_type = content_type.unwrap_or("");
            let boundary = parse_boundary(content_type).ok_or_else(|| {
                StreamError::unsupported(format!(
                    "expected multipart/mixed with a boundary, got {content_type:?}"
                ))
            })?;
            Ok(Box::new(MultipartDecoder::new(&boundary, limits.max_frame_bytes)))
        }
        TransportMode::RawSocket => Ok(Box::new(RawFrameScanner::new(
            limits.max_frame_bytes,
            limits.raw_scan_limit,
        ))),
    }
}

/// Offset of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
