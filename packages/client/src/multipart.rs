//! `multipart/form-data` payload description and streaming writer
//!
//! A form records pre-rendered parameter and header text plus byte ranges of
//! the files it references; file contents are never buffered ahead of time.
//! The running `size` is accumulated as parts are added and equals the exact
//! byte count later emitted on the wire.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{self, Result};
use crate::mime::{mime_type, CONTENT_MULTIPART_FORM_DATA};
use crate::random::generate_boundary;

#[derive(Clone, Debug)]
pub(crate) struct FilePart {
    pub(crate) path: PathBuf,
    pub(crate) chunk_offset: u64,
    pub(crate) chunk_size: u64,
    pub(crate) part_header: String,
}

/// Builder and value object for a multipart form body.
#[derive(Clone, Debug)]
pub struct FormData {
    boundary: String,
    parameters: String,
    files: Vec<FilePart>,
    closing: String,
    size: u64,
}

impl FormData {
    #[must_use]
    pub fn new() -> Self {
        let boundary = generate_boundary();
        let closing = format!("\r\n--{boundary}--\r\n");
        let size = closing.len() as u64;
        FormData {
            boundary,
            parameters: String::new(),
            files: Vec::new(),
            closing,
            size,
        }
    }

    /// Append a plain key/value parameter.
    #[must_use]
    pub fn field(mut self, key: &str, value: &str) -> Self {
        let parameter = format!(
            "\r\n--{0}\r\nContent-Disposition: form-data; name=\"{1}\"\r\n\r\n{2}",
            self.boundary, key, value
        );
        self.size += parameter.len() as u64;
        self.parameters.push_str(&parameter);
        self
    }

    /// Append a whole file part. Fails with `InvalidArgument` when the file
    /// does not exist.
    pub fn file(self, key: &str, filename: &str, path: impl AsRef<Path>) -> Result<Self> {
        let len = std::fs::metadata(path.as_ref())
            .map_err(|_| error::invalid_argument("unknown file"))?
            .len();
        self.file_range(key, filename, path, 0, len)
    }

    /// Append a byte range of a file. The range length is clamped to what the
    /// file actually holds past `offset`; an offset beyond the end of the
    /// file is an `InvalidArgument` error.
    pub fn file_range(
        mut self,
        key: &str,
        filename: &str,
        path: impl AsRef<Path>,
        offset: u64,
        len: u64,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file_size = std::fs::metadata(path)
            .map_err(|_| error::invalid_argument("unknown file"))?
            .len();
        if offset > file_size {
            return Err(error::invalid_argument("invalid offset"));
        }

        let chunk_size = len.min(file_size - offset);
        let part_header = format!(
            "\r\n--{0}\r\nContent-Disposition: form-data; name=\"{1}\"; filename=\"{2}\"\r\nContent-Type: {3}\r\n\r\n",
            self.boundary,
            key,
            filename,
            mime_type(path)
        );

        self.size += part_header.len() as u64 + chunk_size;
        self.files.push(FilePart {
            path: path.to_path_buf(),
            chunk_offset: offset,
            chunk_size,
            part_header,
        });
        Ok(self)
    }

    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Exact byte count the serialized form will occupy on the wire.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn content_type(&self) -> String {
        format!("{}; boundary={}", CONTENT_MULTIPART_FORM_DATA, self.boundary)
    }

    #[cfg(test)]
    pub(crate) fn file_parts(&self) -> &[FilePart] {
        &self.files
    }
}

impl Default for FormData {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming serializer for a form: four phases in strict order, emitting
/// the parameter section, then per file its header followed by bounded data
/// chunks, then the closing boundary.
#[derive(Debug)]
pub(crate) struct FormWriter {
    form: FormData,
    step: Step,
    file: Option<File>,
    file_index: usize,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Parameters,
    FileHeader,
    FileData,
    ClosingBoundary,
    Done,
}

impl FormWriter {
    pub(crate) fn new(form: FormData) -> Self {
        FormWriter {
            form,
            step: Step::Parameters,
            file: None,
            file_index: 0,
            remaining: 0,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.step == Step::Done
    }

    /// Next wire chunk, at most `buf_size` bytes, `None` once the closing
    /// boundary has been emitted. A zero-length file part still yields one
    /// empty data chunk between its header and the next phase.
    pub(crate) async fn next_chunk(&mut self, buf_size: usize) -> Result<Option<Bytes>> {
        match self.step {
            Step::Parameters => {
                self.step = if self.form.files.is_empty() {
                    Step::ClosingBoundary
                } else {
                    Step::FileHeader
                };
                Ok(Some(Bytes::copy_from_slice(
                    self.form.parameters.as_bytes(),
                )))
            }
            Step::FileHeader => {
                let part = &self.form.files[self.file_index];
                let mut file = File::open(&part.path).await.map_err(error::transfer)?;
                file.seek(SeekFrom::Start(part.chunk_offset))
                    .await
                    .map_err(error::transfer)?;
                self.file = Some(file);
                self.remaining = part.chunk_size;
                self.step = Step::FileData;
                Ok(Some(Bytes::copy_from_slice(part.part_header.as_bytes())))
            }
            Step::FileData => {
                let amount = self.remaining.min(buf_size as u64) as usize;
                if amount == 0 {
                    // Zero-length part: empty data emission, then advance.
                    self.next_file();
                    return Ok(Some(Bytes::new()));
                }

                let Some(file) = self.file.as_mut() else {
                    return Err(error::transfer(std::io::Error::other(
                        "multipart file closed mid-part",
                    )));
                };
                let mut buf = vec![0u8; amount];
                let nread = file.read(&mut buf).await.map_err(error::transfer)?;
                if nread == 0 {
                    return Err(error::transfer(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "file shrank during multipart serialization",
                    )));
                }
                buf.truncate(nread);
                self.remaining -= nread as u64;
                if self.remaining == 0 {
                    self.next_file();
                }
                Ok(Some(Bytes::from(buf)))
            }
            Step::ClosingBoundary => {
                self.step = Step::Done;
                Ok(Some(Bytes::copy_from_slice(self.form.closing.as_bytes())))
            }
            Step::Done => Ok(None),
        }
    }

    fn next_file(&mut self) {
        self.file = None;
        self.file_index += 1;
        self.step = if self.file_index >= self.form.files.len() {
            Step::ClosingBoundary
        } else {
            Step::FileHeader
        };
    }
}
