//! Request/response payload representation
//!
//! `Content` is a closed tagged union over the five payload forms shared by
//! requests and responses. Exactly one alternative is active at a time;
//! typed payloads always go through the `Json` alternative via serde.

pub(crate) mod decode;
pub(crate) mod encode;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{self, Result};
use crate::multipart::FormData;

/// A request or response payload.
#[derive(Clone, Debug, Default)]
pub enum Content {
    /// No payload.
    #[default]
    Empty,
    /// Plain text.
    Text(String),
    /// Structured (JSON) value.
    Json(Value),
    /// File-backed payload, identified by path.
    File(PathBuf),
    /// Multipart form payload.
    Form(FormData),
}

impl Content {
    /// Build a `Json` content from any serializable value.
    pub fn serialize<T: Serialize>(value: &T) -> Result<Content> {
        serde_json::to_value(value)
            .map(Content::Json)
            .map_err(error::builder)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Content::Text(_))
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Content::Json(_))
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self, Content::File(_))
    }

    #[must_use]
    pub fn is_form(&self) -> bool {
        matches!(self, Content::Form(_))
    }

    /// The text payload; `TypeMismatch` for any other alternative.
    pub fn text(&self) -> Result<&str> {
        match self {
            Content::Text(text) => Ok(text),
            other => Err(error::type_mismatch("text", other.variant_name())),
        }
    }

    /// The structured payload; `TypeMismatch` for any other alternative.
    pub fn json(&self) -> Result<&Value> {
        match self {
            Content::Json(value) => Ok(value),
            other => Err(error::type_mismatch("json", other.variant_name())),
        }
    }

    /// The file path payload; `TypeMismatch` for any other alternative.
    pub fn file_path(&self) -> Result<&Path> {
        match self {
            Content::File(path) => Ok(path),
            other => Err(error::type_mismatch("file", other.variant_name())),
        }
    }

    /// The multipart form payload; `TypeMismatch` for any other alternative.
    pub fn form(&self) -> Result<&FormData> {
        match self {
            Content::Form(form) => Ok(form),
            other => Err(error::type_mismatch("form", other.variant_name())),
        }
    }

    /// Deserialize the structured payload into a typed value.
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.json()?;
        serde_json::from_value(value.clone())
            .map_err(|e| error::type_mismatch("json", "incompatible value").with(e))
    }

    /// Persist the payload to `path`, creating parent directories as needed.
    ///
    /// `Empty` is a no-op; `Text` and `Json` write their rendered bytes; a
    /// file-backed payload is moved into place with a rename; a multipart
    /// form cannot be saved.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        match self {
            Content::Empty => Ok(()),
            Content::Text(text) => write_data(text.as_bytes(), path),
            Content::Json(value) => {
                let rendered = serde_json::to_string_pretty(value).map_err(error::builder)?;
                write_data(rendered.as_bytes(), path)
            }
            Content::File(src) => {
                create_parent_dirs(path)?;
                std::fs::rename(src, path).map_err(error::transfer)
            }
            Content::Form(_) => Err(error::unsupported("cannot save a multipart form body")),
        }
    }

    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            Content::Empty => "empty",
            Content::Text(_) => "text",
            Content::Json(_) => "json",
            Content::File(_) => "file",
            Content::Form(_) => "form",
        }
    }
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(error::transfer)?;
        }
    }
    Ok(())
}

fn write_data(data: &[u8], path: &Path) -> Result<()> {
    create_parent_dirs(path)?;
    std::fs::write(path, data).map_err(error::transfer)
}

impl From<()> for Content {
    fn from((): ()) -> Self {
        Content::Empty
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_owned())
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Json(value)
    }
}

impl From<PathBuf> for Content {
    fn from(path: PathBuf) -> Self {
        Content::File(path)
    }
}

impl From<&Path> for Content {
    fn from(path: &Path) -> Self {
        Content::File(path.to_path_buf())
    }
}

impl From<FormData> for Content {
    fn from(form: FormData) -> Self {
        Content::Form(form)
    }
}
