//! Request value record
//!
//! The builder-facing pieces of one request: verb, target path, caller
//! headers, payload and per-request options. Immutable once a session takes
//! ownership of serializing it.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;

use crate::body::Content;
use crate::error::{self, Result};
use crate::options::Options;

#[derive(Clone, Debug)]
pub struct RequestParts {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) headers: HeaderMap,
    pub(crate) content: Content,
    pub(crate) options: Options,
}

impl RequestParts {
    #[must_use]
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        RequestParts {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            content: Content::Empty,
            options: Options::default(),
        }
    }

    /// Set a header; the last write per key wins.
    pub fn header(&mut self, key: &str, value: &str) -> Result<()> {
        let name: HeaderName = key.parse().map_err(error::builder)?;
        let value: HeaderValue = value.parse().map_err(error::builder)?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    pub fn set_content(&mut self, content: Content) {
        self.content = content;
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn content(&self) -> &Content {
        &self.content
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }
}
