//! Fluent request builder
//!
//! A [`Request`] is created by the client's verb factories, mutated fluently
//! by the caller and handed to a session by `send()`. Builder-time problems
//! (malformed header, unserializable body) are deferred: `send()` still
//! returns a handle, which resolves to a failed response naming the cause —
//! the same contract as every transport failure.

use std::sync::Arc;

use http::Method;
use serde::Serialize;

use wyre_client::{ClientCore, Content, Error, Options, PendingResponse, RequestParts};

/// One request under construction, bound to the client that created it.
#[derive(Debug)]
pub struct Request {
    core: Arc<ClientCore>,
    parts: RequestParts,
    // First builder error, reported when the request is sent.
    error: Option<Error>,
}

impl Request {
    pub(crate) fn new(core: Arc<ClientCore>, method: Method, target: &str) -> Self {
        Request {
            core,
            parts: RequestParts::new(method, target),
            error: None,
        }
    }

    /// Set a header; the last write per key wins, and caller headers
    /// override the client-generated defaults.
    #[must_use]
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let Err(e) = self.parts.header(key, value) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Per-request options, merged over the client's at send time.
    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.parts.set_options(options);
        self
    }

    /// Attach a payload: text, a JSON value, a file path or a multipart
    /// form.
    #[must_use]
    pub fn body(mut self, content: impl Into<Content>) -> Self {
        self.parts.set_content(content.into());
        self
    }

    /// Attach any serializable value as a structured (JSON) payload.
    #[must_use]
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match Content::serialize(value) {
            Ok(content) => self.parts.set_content(content),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Debug digest of the request line.
    #[must_use]
    pub fn dump(&self) -> String {
        format!("{} {}", self.parts.method(), self.parts.target())
    }

    /// Dispatch the request onto the client's worker pool.
    #[must_use]
    pub fn send(self) -> PendingResponse {
        if let Some(error) = self.error.as_ref() {
            tracing::warn!(%error, "request had a builder error; failing the send");
        }
        self.core.send(self.parts, self.error)
    }
}
