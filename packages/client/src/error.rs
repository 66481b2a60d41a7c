//! Error type shared by the whole client
//!
//! A single `Error` with a `Kind` discriminant and an optional boxed source.
//! Pipeline failures never cross the result slot as errors: the session maps
//! them into a terminal `Response` and callers inspect `status()`/`reason()`.
//! `Error` values returned directly from API calls signal caller mistakes
//! (wrong content accessor, bad multipart file reference, malformed header).

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors produced while building or executing a request.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    detail: Option<String>,
    source: Option<BoxError>,
}

/// Error discriminant, one variant per pipeline stage or contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// DNS resolution failed.
    Resolve,
    /// No resolved endpoint accepted the connection.
    Connect,
    /// TLS handshake failed.
    Handshake,
    /// Read or write I/O error while transferring the request or response.
    Transfer,
    /// The request was canceled by the caller.
    Canceled,
    /// Bad argument, e.g. a multipart file reference that does not exist.
    InvalidArgument,
    /// A content accessor was called for the wrong alternative.
    TypeMismatch,
    /// Operation not available for this content alternative.
    Unsupported,
    /// The request could not be built (malformed header, serialization).
    Builder,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(Inner {
                kind,
                detail: None,
                source: None,
            }),
        }
    }

    #[must_use]
    pub(crate) fn with<E: Into<BoxError>>(mut self, source: E) -> Error {
        self.inner.source = Some(source.into());
        self
    }

    #[must_use]
    pub(crate) fn detail(mut self, detail: impl Into<String>) -> Error {
        self.inner.detail = Some(detail.into());
        self
    }

    /// The error discriminant.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// True when this error represents a caller-initiated cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.inner.kind == Kind::Canceled
    }
}

// Constructor helpers, one per kind.
pub(crate) fn resolve<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Resolve).with(e)
}

pub(crate) fn connect<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Connect).with(e)
}

pub(crate) fn handshake<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Handshake).with(e)
}

pub(crate) fn transfer<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Transfer).with(e)
}

pub(crate) fn invalid_argument(detail: impl Into<String>) -> Error {
    Error::new(Kind::InvalidArgument).detail(detail)
}

pub(crate) fn type_mismatch(expected: &str, actual: &str) -> Error {
    Error::new(Kind::TypeMismatch).detail(format!("expected {expected}, content is {actual}"))
}

pub(crate) fn unsupported(detail: impl Into<String>) -> Error {
    Error::new(Kind::Unsupported).detail(detail)
}

pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Builder).with(e)
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("wyre::Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref detail) = self.inner.detail {
            f.field("detail", detail);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phrase = match self.inner.kind {
            Kind::Resolve => "dns resolution error",
            Kind::Connect => "connection error",
            Kind::Handshake => "tls handshake error",
            Kind::Transfer => "transfer error",
            Kind::Canceled => "request canceled",
            Kind::InvalidArgument => "invalid argument",
            Kind::TypeMismatch => "content type mismatch",
            Kind::Unsupported => "unsupported operation",
            Kind::Builder => "request builder error",
        };
        f.write_str(phrase)?;
        if let Some(ref detail) = self.inner.detail {
            write!(f, ": {detail}")?;
        }
        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}
