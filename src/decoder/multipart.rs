use super::{find, DecodedFrame, FrameDecoder};
use crate::error::{FrameError, StreamError};
use crate::event::RawEvent;
use bytes::{Buf, BytesMut};
use tracing::debug;

/// Longest header block accepted for a single part.
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Extract the boundary from a `multipart/mixed` content type.
///
/// Media type comparison is case-insensitive; the boundary may be quoted.
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let mut pieces = content_type.split(';');
    let media_type = pieces.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/mixed") {
        return None;
    }
    pieces
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    /// Looking for the next delimiter line.
    Delimiter,
    /// Reading the part's header block.
    Headers,
    /// Reading the body; `Some(n)` when the part declared `Content-Length`.
    Body(Option<usize>),
    /// Close delimiter seen.
    Closed,
}

/// Incremental `multipart/mixed` parser.
///
/// Parts declaring `Content-Length` are emitted as soon as the body is buffered: this vendor only
/// writes the next delimiter together with the next push, so waiting for it would hold every
/// alarm back by one event. A delimiter showing up before the declared length wins.
#[derive(Debug)]
pub struct MultipartDecoder {
    delimiter: Vec<u8>,
    buf: BytesMut,
    state: PartState,
    max_part_bytes: usize,
}

impl MultipartDecoder {
    pub fn new(boundary: &str, max_part_bytes: usize) -> Self {
        let mut delimiter = b"--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());
        Self { delimiter, buf: BytesMut::new(), state: PartState::Delimiter, max_part_bytes }
    }

    pub fn is_closed(&self) -> bool {
        self.state == PartState::Closed
    }

    /// Position of a delimiter that starts a line (start of buffer or right after `\n`) and is
    /// followed by `--`, padding or the line break. `--boundaryX` is body text, not a delimiter.
    fn line_delimiter(&self, from: usize) -> Option<usize> {
        let mut offset = from;
        while let Some(pos) = find(&self.buf[offset..], &self.delimiter) {
            let at = offset + pos;
            let line_start = at == 0 || self.buf[at - 1] == b'\n';
            let terminated = matches!(
                self.buf.get(at + self.delimiter.len()),
                Some(b'-' | b'\r' | b'\n' | b' ' | b'\t')
            );
            if line_start && terminated {
                return Some(at);
            }
            offset = at + 1;
        }
        None
    }

    /// Advance one step. Returns `false` when more input is needed.
    fn step(&mut self, out: &mut Vec<DecodedFrame>) -> bool {
        match self.state {
            PartState::Closed => {
                self.buf.clear();
                false
            }
            PartState::Delimiter => self.take_delimiter_line(),
            PartState::Headers => self.take_headers(out),
            PartState::Body(length) => self.take_body(length, out),
        }
    }

    fn take_delimiter_line(&mut self) -> bool {
        let Some(at) = self.line_delimiter(0) else {
            // keep enough to recognise a delimiter split across chunks
            let keep = self.delimiter.len() + 1;
            if self.buf.len() > keep {
                let drop = self.buf.len() - keep;
                self.buf.advance(drop);
            }
            return false;
        };
        let after = at + self.delimiter.len();
        if self.buf.len() < after + 2 {
            return false;
        }
        if &self.buf[after..after + 2] == b"--" {
            self.buf.clear();
            self.state = PartState::Closed;
            return false;
        }
        // transport padding may trail the boundary before the line break
        let Some(eol) = self.buf[after..].iter().position(|&b| b == b'\n') else {
            if self.buf.len() - after > MAX_HEADER_BYTES {
                self.buf.advance(after);
            }
            return false;
        };
        self.buf.advance(after + eol + 1);
        self.state = PartState::Headers;
        true
    }

    fn take_headers(&mut self, out: &mut Vec<DecodedFrame>) -> bool {
        let end = if self.buf.starts_with(b"\r\n") {
            Some((0, 2))
        } else if self.buf.starts_with(b"\n") {
            Some((0, 1))
        } else {
            match (find(&self.buf, b"\r\n\r\n"), find(&self.buf, b"\n\n")) {
                (Some(a), Some(b)) if b + 1 < a => Some((b + 1, 1)),
                (Some(a), _) => Some((a + 2, 2)),
                (None, Some(b)) => Some((b + 1, 1)),
                (None, None) => None,
            }
        };
        let Some((header_len, terminator)) = end else {
            if self.buf.len() > MAX_HEADER_BYTES {
                out.push(Err(FrameError::PartHeaders(format!(
                    "no header terminator within {MAX_HEADER_BYTES} bytes"
                ))));
                self.buf.clear();
                self.state = PartState::Delimiter;
                return true;
            }
            return false;
        };

        let headers = String::from_utf8_lossy(&self.buf[..header_len]).into_owned();
        self.buf.advance(header_len + terminator);

        let mut length = None;
        for line in headers.lines() {
            let Some((name, value)) = line.split_once(':') else { continue };
            if name.trim().eq_ignore_ascii_case("content-length") {
                match value.trim().parse::<usize>() {
                    Ok(n) => length = Some(n),
                    Err(_) => {
                        out.push(Err(FrameError::PartHeaders(format!(
                            "bad Content-Length {:?}",
                            value.trim()
                        ))));
                    }
                }
            }
        }
        if let Some(n) = length {
            if n > self.max_part_bytes {
                out.push(Err(FrameError::Oversized { limit: self.max_part_bytes }));
                self.state = PartState::Delimiter;
                return true;
            }
        }
        self.state = PartState::Body(length);
        true
    }

    fn take_body(&mut self, length: Option<usize>, out: &mut Vec<DecodedFrame>) -> bool {
        let delimiter_at = self.line_delimiter(0);
        let body_end = match (length, delimiter_at) {
            (Some(n), Some(d)) if d < n => Some(trim_line_break(&self.buf[..d])),
            (Some(n), _) if self.buf.len() >= n => Some(n),
            (None, Some(d)) => Some(trim_line_break(&self.buf[..d])),
            _ => None,
        };
        let Some(end) = body_end else {
            if self.buf.len() > self.max_part_bytes {
                out.push(Err(FrameError::Oversized { limit: self.max_part_bytes }));
                self.buf.clear();
                self.state = PartState::Delimiter;
                return true;
            }
            return false;
        };

        let body = self.buf.split_to(end);
        out.push(RawEvent::from_xml(&body));
        self.state = PartState::Delimiter;
        true
    }
}

/// Length of `body` without the line break that precedes a delimiter.
fn trim_line_break(body: &[u8]) -> usize {
    if body.ends_with(b"\r\n") {
        body.len() - 2
    } else if body.ends_with(b"\n") {
        body.len() - 1
    } else {
        body.len()
    }
}

impl FrameDecoder for MultipartDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<DecodedFrame>, StreamError> {
        if self.state == PartState::Closed {
            return Ok(Vec::new());
        }
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while self.step(&mut out) {}
        if self.state == PartState::Closed {
            debug!(target: "alarmstream::decoder", "multipart close delimiter received");
        }
        Ok(out)
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }
}
