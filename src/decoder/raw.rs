use super::{find, DecodedFrame, FrameDecoder};
use crate::error::{FrameError, StreamError};
use crate::event::RawEvent;
use bytes::{Buf, BytesMut};
use tracing::trace;

const OPEN_TAG: &[u8] = b"<EventNotificationAlert";
const CLOSE_TAG: &[u8] = b"</EventNotificationAlert>";

/// Content scanner for raw-socket streams.
///
/// Ignores HTTP and multipart framing entirely and extracts every
/// `<EventNotificationAlert ...>...</EventNotificationAlert>` document from the byte stream.
/// Between documents only the last `OPEN_TAG.len() - 1` bytes are retained, so a tag split across
/// chunks is still found and the buffer never grows on noise.
#[derive(Debug)]
pub struct RawFrameScanner {
    buf: BytesMut,
    max_frame_bytes: usize,
    scan_limit: usize,
    /// Bytes discarded before the first document was located.
    scanned: usize,
    found_any: bool,
}

impl RawFrameScanner {
    pub fn new(max_frame_bytes: usize, scan_limit: usize) -> Self {
        Self { buf: BytesMut::new(), max_frame_bytes, scan_limit, scanned: 0, found_any: false }
    }

    fn discard(&mut self, n: usize) {
        if !self.found_any {
            self.scanned += n;
        }
        self.buf.advance(n);
    }
}

impl FrameDecoder for RawFrameScanner {
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<DecodedFrame>, StreamError> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        loop {
            let Some(open) = find(&self.buf, OPEN_TAG) else {
                let keep = OPEN_TAG.len() - 1;
                if self.buf.len() > keep {
                    let drop = self.buf.len() - keep;
                    self.discard(drop);
                }
                break;
            };
            self.discard(open);
            self.found_any = true;

            match find(&self.buf[OPEN_TAG.len()..], CLOSE_TAG) {
                Some(rel) => {
                    let end = OPEN_TAG.len() + rel + CLOSE_TAG.len();
                    if end > self.max_frame_bytes {
                        out.push(Err(FrameError::Oversized { limit: self.max_frame_bytes }));
                        self.buf.advance(end);
                        continue;
                    }
                    let frame = self.buf.split_to(end);
                    trace!(
                        target: "alarmstream::decoder",
                        bytes = frame.len(),
                        "raw frame located"
                    );
                    out.push(RawEvent::from_xml(&frame));
                }
                None => {
                    if self.buf.len() > self.max_frame_bytes {
                        // give up on this document and rescan after its opening tag
                        out.push(Err(FrameError::Oversized { limit: self.max_frame_bytes }));
                        self.buf.advance(OPEN_TAG.len());
                        continue;
                    }
                    break;
                }
            }
        }

        if !self.found_any && self.scanned > self.scan_limit {
            return Err(StreamError::unsupported(format!(
                "no alert document within the first {} bytes",
                self.scan_limit
            )));
        }
        Ok(out)
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }
}
