//! Response value record

use std::path::{Path, PathBuf};

use http::StatusCode;

use crate::body::Content;
use crate::error::Result;

/// Status value before any response was received; distinct from every real
/// HTTP status code. A transport-level failure leaves it in place.
pub const STATUS_UNKNOWN: u16 = 0;

/// Synthetic status for a caller-canceled request.
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

/// The terminal result of one request: status, reason phrase and decoded
/// payload. File-backed payloads also carry the temp path they were
/// streamed to until the caller persists or discards them.
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub(crate) status: u16,
    pub(crate) reason: String,
    pub(crate) body: Content,
    pub(crate) temp_path: Option<PathBuf>,
}

impl Response {
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase, or the `"{context}; {error}"` description of a
    /// transport failure.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn body(&self) -> &Content {
        &self.body
    }

    /// True iff the server answered 200 OK.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }

    /// Path of the temp file holding a file-backed body, if any.
    #[must_use]
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_path.as_deref()
    }

    /// Persist the body to `path`; see [`Content::save_to`].
    pub fn save(&self, path: &Path) -> Result<()> {
        self.body.save_to(path)
    }

    pub(crate) fn mark_canceled(&mut self) {
        self.status = STATUS_CLIENT_CLOSED_REQUEST;
        self.reason = "Request canceled".to_owned();
    }

    pub(crate) fn mark_failed(&mut self, context: &str, error: &crate::error::Error) {
        self.reason = format!("{context}; {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_the_unset_sentinel() {
        let response = Response::default();
        assert_eq!(response.status(), STATUS_UNKNOWN);
        assert!(!response.ok());
        assert!(response.body().is_empty());
    }

    #[test]
    fn cancellation_sets_the_synthetic_status() {
        let mut response = Response::default();
        response.mark_canceled();
        assert_eq!(response.status(), STATUS_CLIENT_CLOSED_REQUEST);
        assert_eq!(response.reason(), "Request canceled");
    }

    #[test]
    fn failure_keeps_the_unset_status_and_embeds_the_cause() {
        let mut response = Response::default();
        let err = crate::error::connect(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        response.mark_failed("Failed to connect to host:80", &err);
        assert_eq!(response.status(), STATUS_UNKNOWN);
        assert!(response.reason().starts_with("Failed to connect to host:80; "));
        assert!(response.reason().contains("refused"));
    }
}
