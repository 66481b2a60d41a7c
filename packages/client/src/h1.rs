//! HTTP/1.1 wire framing
//!
//! Request-head rendering, incremental response-head parsing and response
//! body framing (content-length, chunked, read-to-EOF). The session drives
//! the socket; this module only turns bytes into structure and back.

use bytes::{Buf, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::Method;

use crate::error::{self, Result};

const MAX_HEADERS: usize = 64;

/// Render the request line and header block, terminated by the empty line.
pub(crate) fn render_request_head(method: &Method, target: &str, headers: &HeaderMap) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Parsed response status line and header block.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub(crate) status: u16,
    pub(crate) reason: String,
    pub(crate) headers: HeaderMap,
}

impl ResponseHead {
    pub(crate) fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Try to parse a complete response head from the front of `buf`. Returns
/// the head and its length in bytes, or `None` when more input is needed.
pub(crate) fn parse_response_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut headers);
    match parsed.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            let mut map = HeaderMap::with_capacity(parsed.headers.len());
            for header in parsed.headers.iter() {
                let name =
                    HeaderName::from_bytes(header.name.as_bytes()).map_err(error::transfer)?;
                let value = HeaderValue::from_bytes(header.value).map_err(error::transfer)?;
                map.append(name, value);
            }
            let head = ResponseHead {
                status: parsed.code.unwrap_or(0),
                reason: parsed.reason.unwrap_or_default().to_owned(),
                headers: map,
            };
            Ok(Some((head, len)))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(e) => Err(error::transfer(e)),
    }
}

/// How the response body ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    ContentLength(u64),
    Chunked,
    /// No length information: the body runs until the peer closes.
    ReadToEof,
}

pub(crate) fn body_framing(head: &ResponseHead) -> BodyFraming {
    let chunked = head
        .headers
        .get(TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return BodyFraming::Chunked;
    }
    match head.content_length() {
        Some(len) => BodyFraming::ContentLength(len),
        None => BodyFraming::ReadToEof,
    }
}

/// Incremental `Transfer-Encoding: chunked` decoder. Feed it raw socket
/// bytes; it appends decoded body bytes to `out` and reports completion
/// after the terminating zero chunk and trailer section.
#[derive(Debug)]
pub(crate) struct ChunkedDecoder {
    state: ChunkState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailers,
    Done,
}

impl ChunkedDecoder {
    pub(crate) fn new() -> Self {
        ChunkedDecoder {
            state: ChunkState::Size,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Consume as much of `input` as the current state allows, appending
    /// decoded payload bytes to `out`. Call again with more input while
    /// `is_done()` is false.
    pub(crate) fn decode(&mut self, input: &mut BytesMut, out: &mut Vec<u8>) -> Result<()> {
        loop {
            match self.state {
                ChunkState::Size => {
                    let Some(line_end) = find_crlf(input) else {
                        if input.len() > MAX_CHUNK_LINE {
                            return Err(malformed("chunk size line too long"));
                        }
                        return Ok(());
                    };
                    let size = parse_chunk_size(&input[..line_end])?;
                    input.advance(line_end + 2);
                    self.state = if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data { remaining: size }
                    };
                }
                ChunkState::Data { remaining } => {
                    if input.is_empty() {
                        return Ok(());
                    }
                    let take = remaining.min(input.len() as u64) as usize;
                    out.extend_from_slice(&input[..take]);
                    input.advance(take);
                    let remaining = remaining - take as u64;
                    self.state = if remaining == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data { remaining }
                    };
                }
                ChunkState::DataEnd => {
                    if input.len() < 2 {
                        return Ok(());
                    }
                    if &input[..2] != b"\r\n" {
                        return Err(malformed("missing CRLF after chunk data"));
                    }
                    input.advance(2);
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    let Some(line_end) = find_crlf(input) else {
                        if input.len() > MAX_CHUNK_LINE {
                            return Err(malformed("trailer line too long"));
                        }
                        return Ok(());
                    };
                    let empty = line_end == 0;
                    input.advance(line_end + 2);
                    if empty {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => return Ok(()),
            }
        }
    }
}

const MAX_CHUNK_LINE: usize = 256;

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_chunk_size(line: &[u8]) -> Result<u64> {
    // Chunk extensions after ';' are ignored.
    let digits = line.split(|&b| b == b';').next().unwrap_or_default();
    let digits = std::str::from_utf8(digits)
        .map_err(|_| malformed("non-ascii chunk size"))?
        .trim();
    if digits.is_empty() || digits.len() > 16 {
        return Err(malformed("bad chunk size"));
    }
    u64::from_str_radix(digits, 16).map_err(|_| malformed("bad chunk size"))
}

fn malformed(what: &str) -> crate::error::Error {
    error::transfer(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("malformed chunked encoding: {what}"),
    ))
}
