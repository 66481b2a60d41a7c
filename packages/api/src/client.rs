//! Client handle and verb factories

use std::sync::Arc;

use http::Method;

use wyre_client::{ClientCore, Options, Result, SessionId};

use crate::builder::Request;

/// Persistent client handle: base URL, client-level options and the owned
/// worker pool. Requests built from it inherit its options, each request's
/// own options winning field by field.
#[derive(Debug)]
pub struct Client {
    core: Arc<ClientCore>,
}

impl Client {
    /// Create a client for `(scheme://)?host(:port)?` with default options.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_options(base_url, Options::default())
    }

    /// Create a client with client-level options; `nb_threads` sizes the
    /// worker pool once, here.
    pub fn with_options(base_url: &str, options: Options) -> Result<Self> {
        Ok(Client {
            core: ClientCore::new(base_url, options)?,
        })
    }

    fn request(&self, method: Method, target: &str) -> Request {
        Request::new(self.core.clone(), method, target)
    }

    #[must_use]
    pub fn get(&self, target: &str) -> Request {
        self.request(Method::GET, target)
    }

    #[must_use]
    pub fn post(&self, target: &str) -> Request {
        self.request(Method::POST, target)
    }

    #[must_use]
    pub fn put(&self, target: &str) -> Request {
        self.request(Method::PUT, target)
    }

    #[must_use]
    pub fn patch(&self, target: &str) -> Request {
        self.request(Method::PATCH, target)
    }

    #[must_use]
    pub fn delete(&self, target: &str) -> Request {
        self.request(Method::DELETE, target)
    }

    /// Cancel one in-flight request; a no-op when it already completed.
    pub fn cancel(&self, id: SessionId) {
        self.core.cancel(id);
    }

    /// Cancel every in-flight request.
    pub fn cancel_all(&self) {
        self.core.cancel_all();
    }

    /// Stop accepting new requests and join the worker threads. Idempotent,
    /// and implied by dropping the client.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }
}
