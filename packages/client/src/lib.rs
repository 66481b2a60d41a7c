//! # Wyre HTTP client implementation
//!
//! Internal machinery behind the `wyre` crate: the per-request session
//! pipeline, the shared content model, the multipart writer, the HTTP/1.1
//! wire codec and the client core owning the worker pool and the session
//! registry. Applications should depend on `wyre` instead of this crate.
//!
//! Each request runs on one dedicated connection, used once: the session
//! resolves the host, connects (optionally through a TLS handshake), streams
//! the request body, reads the response header, dispatches the body into one
//! of the content alternatives and fulfills a one-shot result slot — with
//! cooperative cancellation and per-step timeouts at every suspension point.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod body;
pub mod client;
pub mod error;
pub(crate) mod h1;
pub mod mime;
pub mod multipart;
pub mod options;
pub(crate) mod random;
pub mod request;
pub mod response;
pub(crate) mod session;

pub use body::Content;
pub use client::{ClientCore, PendingResponse};
pub use error::{Error, Kind, Result};
pub use multipart::FormData;
pub use options::{
    Options, ProgressFn, DEFAULT_BUFFER_SIZE, DEFAULT_NB_THREADS, DEFAULT_PROGRESS_STEP,
};
pub use request::RequestParts;
pub use response::{Response, STATUS_CLIENT_CLOSED_REQUEST, STATUS_UNKNOWN};
pub use session::SessionId;
