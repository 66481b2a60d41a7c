//! # Wyre — embeddable asynchronous HTTP/HTTPS client
//!
//! Build requests against a persistent [`Client`] handle, submit them, and
//! receive a handle resolving to a [`Response`] while the work executes on a
//! background worker pool owned by the client. One dedicated connection per
//! request, used once; no redirect following, cookies or caching.
//!
//! ```no_run
//! use wyre::Client;
//!
//! # fn main() -> wyre::Result<()> {
//! let client = Client::new("http://127.0.0.1:8281")?;
//! let response = client
//!     .post("/echo")
//!     .body("hello world")
//!     .send()
//!     .wait();
//! if response.ok() {
//!     println!("{}", response.body().text()?);
//! } else {
//!     println!("{}", response.reason());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Failures never surface as panics or errors from `send()`: every request
//! resolves to a terminal `Response`, and transport problems are reported
//! through `status()` (left at its unset sentinel) and `reason()`.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod auth;
pub mod builder;
mod client;

pub use builder::Request;
pub use client::Client;

// Re-export the types callers touch from the client package.
pub use wyre_client::{
    Content, Error, FormData, Kind, Options, PendingResponse, Response, Result, SessionId,
    STATUS_CLIENT_CLOSED_REQUEST, STATUS_UNKNOWN,
};
