//! Response-side body decoding strategies
//!
//! The strategy is selected from the response's `Content-Type` header alone,
//! never from what the request sent. Text and structured bodies accumulate
//! in memory; every other typed body streams into a file sink that is
//! deleted again if the transfer does not complete.

use std::path::PathBuf;

use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::body::Content;
use crate::error::{self, Result};
use crate::mime;
use crate::options::Options;
use crate::random::temp_token;

/// Decoding strategy implied by a `Content-Type` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeKind {
    Empty,
    Text,
    Json,
    Multipart,
    File,
}

/// Classify a response `Content-Type` header.
pub(crate) fn decode_kind(content_type: Option<&str>) -> DecodeKind {
    let Some(content_type) = content_type else {
        return DecodeKind::Empty;
    };
    if content_type.is_empty() {
        DecodeKind::Empty
    } else if content_type.contains(mime::CONTENT_APPLICATION_TEXT)
        || content_type.starts_with(mime::CONTENT_TEXT)
    {
        DecodeKind::Text
    } else if content_type.contains(mime::CONTENT_APPLICATION_JSON) {
        DecodeKind::Json
    } else if content_type.contains(mime::CONTENT_MULTIPART_FORM_DATA) {
        DecodeKind::Multipart
    } else {
        DecodeKind::File
    }
}

/// Destination for response body bytes.
#[derive(Debug)]
pub(crate) enum BodySink {
    /// No payload expected; any stray bytes are discarded.
    Empty,
    Text {
        buf: Vec<u8>,
    },
    Json {
        buf: Vec<u8>,
    },
    File {
        file: File,
        path: PathBuf,
    },
}

impl BodySink {
    /// Allocate the sink for `kind`. Multipart response bodies are reserved
    /// and rejected as unsupported; file sinks honor `file_out`, `temp_dir`
    /// and `file_append` in that order of precedence.
    pub(crate) async fn open(kind: DecodeKind, options: &Options) -> Result<BodySink> {
        match kind {
            DecodeKind::Empty => Ok(BodySink::Empty),
            DecodeKind::Text => Ok(BodySink::Text { buf: Vec::new() }),
            DecodeKind::Json => Ok(BodySink::Json { buf: Vec::new() }),
            DecodeKind::Multipart => Err(error::unsupported("multipart response body")),
            DecodeKind::File => {
                let path = options.file_out.clone().unwrap_or_else(|| {
                    options
                        .temp_dir
                        .clone()
                        .unwrap_or_else(std::env::temp_dir)
                        .join(temp_token())
                });
                let append = options.file_append.unwrap_or(false);
                let file = if append {
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .await
                } else {
                    File::create(&path).await
                }
                .map_err(error::transfer)?;
                Ok(BodySink::File { file, path })
            }
        }
    }

    pub(crate) async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            BodySink::Empty => Ok(()),
            BodySink::Text { buf } | BodySink::Json { buf } => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            BodySink::File { file, .. } => file.write_all(bytes).await,
        }
    }

    /// Finalize into the response content, flushing file sinks. A structured
    /// body that fails to parse decodes as a null value, not a failure.
    pub(crate) async fn finish(self) -> std::io::Result<(Content, Option<PathBuf>)> {
        match self {
            BodySink::Empty => Ok((Content::Empty, None)),
            BodySink::Text { buf } => Ok((
                Content::Text(String::from_utf8_lossy(&buf).into_owned()),
                None,
            )),
            BodySink::Json { buf } => {
                let value = match serde_json::from_slice::<Value>(&buf) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!("response claimed application/json but did not parse: {e}");
                        Value::Null
                    }
                };
                Ok((Content::Json(value), None))
            }
            BodySink::File { mut file, path } => {
                file.flush().await?;
                drop(file);
                Ok((Content::File(path.clone()), Some(path)))
            }
        }
    }

    /// Tear down a sink whose transfer did not complete, deleting any
    /// partially written file.
    pub(crate) async fn abort(self) {
        if let BodySink::File { file, path } = self {
            drop(file);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("could not remove partial download {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_the_response_header() {
        assert_eq!(decode_kind(None), DecodeKind::Empty);
        assert_eq!(decode_kind(Some("")), DecodeKind::Empty);
        assert_eq!(decode_kind(Some("text/plain")), DecodeKind::Text);
        assert_eq!(decode_kind(Some("text/html; charset=utf-8")), DecodeKind::Text);
        assert_eq!(decode_kind(Some("application/text")), DecodeKind::Text);
        assert_eq!(decode_kind(Some("application/json")), DecodeKind::Json);
        assert_eq!(
            decode_kind(Some("application/json; charset=utf-8")),
            DecodeKind::Json
        );
        assert_eq!(
            decode_kind(Some("multipart/form-data; boundary=x")),
            DecodeKind::Multipart
        );
        assert_eq!(decode_kind(Some("application/pdf")), DecodeKind::File);
        assert_eq!(decode_kind(Some("image/png")), DecodeKind::File);
    }

    #[tokio::test]
    async fn multipart_sink_is_unsupported() {
        let err = BodySink::open(DecodeKind::Multipart, &Options::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Unsupported);
    }

    #[tokio::test]
    async fn invalid_json_decodes_as_null() {
        let mut sink = BodySink::open(DecodeKind::Json, &Options::new())
            .await
            .expect("open");
        sink.write(b"{not json").await.expect("write");
        let (content, temp) = sink.finish().await.expect("finish");
        assert!(temp.is_none());
        assert_eq!(content.json().expect("json"), &Value::Null);
    }

    #[tokio::test]
    async fn file_sink_streams_to_temp_dir_and_abort_removes_it() {
        let dir = std::env::temp_dir().join(format!("wyre-sink-{}", temp_token()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let options = Options::new().temp_dir(&dir);

        let mut sink = BodySink::open(DecodeKind::File, &options).await.expect("open");
        sink.write(b"partial").await.expect("write");
        sink.abort().await;
        assert_eq!(std::fs::read_dir(&dir).expect("dir").count(), 0);

        let mut sink = BodySink::open(DecodeKind::File, &options).await.expect("open");
        sink.write(b"complete").await.expect("write");
        let (content, temp) = sink.finish().await.expect("finish");
        let path = temp.expect("temp path");
        assert_eq!(content.file_path().expect("path"), path);
        assert_eq!(std::fs::read(&path).expect("read"), b"complete");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn file_out_and_append_are_honored() {
        let dir = std::env::temp_dir().join(format!("wyre-sink-{}", temp_token()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let out = dir.join("download.bin");
        std::fs::write(&out, b"AAA").expect("seed");

        let options = Options::new().file_out(&out).file_append(true);
        let mut sink = BodySink::open(DecodeKind::File, &options).await.expect("open");
        sink.write(b"BBB").await.expect("write");
        sink.finish().await.expect("finish");
        assert_eq!(std::fs::read(&out).expect("read"), b"AAABBB");

        let options = Options::new().file_out(&out);
        let mut sink = BodySink::open(DecodeKind::File, &options).await.expect("open");
        sink.write(b"CCC").await.expect("write");
        sink.finish().await.expect("finish");
        assert_eq!(std::fs::read(&out).expect("read"), b"CCC");

        std::fs::remove_dir_all(&dir).ok();
    }
}
