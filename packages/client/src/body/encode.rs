//! Request-side body serialization strategies
//!
//! One strategy per content alternative: everything is emitted as bounded
//! chunks pulled by the session's write loop, and the total size is always
//! known up front so requests carry an exact `Content-Length`.

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::body::Content;
use crate::error::{self, Result};
use crate::mime::{self, mime_type};
use crate::multipart::FormWriter;

/// A content payload prepared for the wire.
#[derive(Debug)]
pub(crate) struct EncodedBody {
    pub(crate) stream: BodyStream,
    /// `Content-Type` header value implied by the alternative, if any.
    pub(crate) content_type: Option<String>,
    pub(crate) content_length: u64,
}

/// Pull-based chunk source over the active alternative.
#[derive(Debug)]
pub(crate) enum BodyStream {
    Empty,
    Buffer { data: Bytes, pos: usize },
    File { file: File, remaining: u64 },
    Form(FormWriter),
}

impl EncodedBody {
    /// Bind an encoding strategy to `content`. File-backed payloads are
    /// opened (and sized) here so that a bad path fails before any byte is
    /// written to the socket.
    pub(crate) async fn open(content: &Content) -> Result<EncodedBody> {
        match content {
            Content::Empty => Ok(EncodedBody {
                stream: BodyStream::Empty,
                content_type: None,
                content_length: 0,
            }),
            Content::Text(text) => {
                let data = Bytes::copy_from_slice(text.as_bytes());
                Ok(EncodedBody {
                    content_length: data.len() as u64,
                    content_type: Some(mime::CONTENT_APPLICATION_TEXT.to_owned()),
                    stream: BodyStream::Buffer { data, pos: 0 },
                })
            }
            Content::Json(value) => {
                let data = Bytes::from(serde_json::to_vec(value).map_err(error::builder)?);
                Ok(EncodedBody {
                    content_length: data.len() as u64,
                    content_type: Some(mime::CONTENT_APPLICATION_JSON.to_owned()),
                    stream: BodyStream::Buffer { data, pos: 0 },
                })
            }
            Content::File(path) => {
                let file = File::open(path).await.map_err(error::transfer)?;
                let len = file.metadata().await.map_err(error::transfer)?.len();
                Ok(EncodedBody {
                    stream: BodyStream::File {
                        file,
                        remaining: len,
                    },
                    content_type: Some(mime_type(path).to_owned()),
                    content_length: len,
                })
            }
            Content::Form(form) => Ok(EncodedBody {
                content_type: Some(form.content_type()),
                content_length: form.size(),
                stream: BodyStream::Form(FormWriter::new(form.clone())),
            }),
        }
    }
}

impl BodyStream {
    /// Next chunk of at most `buf_size` bytes; `None` when the body is
    /// exhausted.
    pub(crate) async fn next_chunk(&mut self, buf_size: usize) -> Result<Option<Bytes>> {
        match self {
            BodyStream::Empty => Ok(None),
            BodyStream::Buffer { data, pos } => {
                if *pos >= data.len() {
                    return Ok(None);
                }
                let end = (*pos + buf_size).min(data.len());
                let chunk = data.slice(*pos..end);
                *pos = end;
                Ok(Some(chunk))
            }
            BodyStream::File { file, remaining } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                let amount = (*remaining).min(buf_size as u64) as usize;
                let mut buf = vec![0u8; amount];
                let nread = file.read(&mut buf).await.map_err(error::transfer)?;
                if nread == 0 {
                    return Err(error::transfer(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "file shrank during serialization",
                    )));
                }
                buf.truncate(nread);
                *remaining -= nread as u64;
                Ok(Some(Bytes::from(buf)))
            }
            BodyStream::Form(writer) => writer.next_chunk(buf_size).await,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        match self {
            BodyStream::Empty => true,
            BodyStream::Buffer { data, pos } => *pos >= data.len(),
            BodyStream::File { remaining, .. } => *remaining == 0,
            BodyStream::Form(writer) => writer.is_done(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::temp_token;
    use serde_json::json;

    async fn drain(stream: &mut BodyStream, buf_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next_chunk(buf_size).await.expect("chunk") {
            out.extend_from_slice(&chunk);
        }
        assert!(stream.is_done());
        out
    }

    #[tokio::test]
    async fn empty_body_has_no_chunks_and_zero_length() {
        let mut body = EncodedBody::open(&Content::Empty).await.expect("open");
        assert_eq!(body.content_length, 0);
        assert!(body.content_type.is_none());
        assert!(drain(&mut body.stream, 16).await.is_empty());
    }

    #[tokio::test]
    async fn text_body_is_chunked_to_buffer_size() {
        let mut body = EncodedBody::open(&Content::from("hello world"))
            .await
            .expect("open");
        assert_eq!(body.content_type.as_deref(), Some("application/text"));
        assert_eq!(body.content_length, 11);

        let first = body.stream.next_chunk(4).await.expect("chunk").expect("some");
        assert_eq!(&first[..], b"hell");
        assert!(!body.stream.is_done());
        let rest = drain(&mut body.stream, 4).await;
        assert_eq!(&rest[..], b"o world");
    }

    #[tokio::test]
    async fn json_body_serializes_once() {
        let mut body = EncodedBody::open(&Content::from(json!({"name": "captain", "age": 42})))
            .await
            .expect("open");
        assert_eq!(body.content_type.as_deref(), Some("application/json"));
        let bytes = drain(&mut body.stream, 1024).await;
        assert_eq!(bytes.len() as u64, body.content_length);
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");
        assert_eq!(value["name"], "captain");
    }

    #[tokio::test]
    async fn file_body_streams_and_types_by_extension() {
        let path = std::env::temp_dir().join(format!("wyre-enc-{}.txt", temp_token()));
        std::fs::write(&path, b"0123456789").expect("scratch");

        let mut body = EncodedBody::open(&Content::from(path.clone()))
            .await
            .expect("open");
        assert_eq!(body.content_type.as_deref(), Some("text/plain"));
        assert_eq!(body.content_length, 10);
        let bytes = drain(&mut body.stream, 3).await;
        assert_eq!(&bytes[..], b"0123456789");

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn missing_file_fails_at_open() {
        let err = EncodedBody::open(&Content::File("/nonexistent/wyre-body".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Transfer);
    }
}
