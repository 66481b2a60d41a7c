//! Layered request/client configuration
//!
//! Every field is optional: "unset" is distinct from "set to the default
//! value". Client-level options are merged with per-request options at send
//! time, the request winning field by field. Numeric defaults are applied at
//! the point of use only, never baked into a merged value.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Progress callback, invoked as `(total_bytes, processed_bytes)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Fraction of the payload between two progress reports.
pub const DEFAULT_PROGRESS_STEP: f64 = 0.01;
/// Worker threads driving the shared event loop.
pub const DEFAULT_NB_THREADS: usize = 1;
/// Read/write chunk size.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Partially-specified configuration record.
#[derive(Clone, Default)]
pub struct Options {
    pub(crate) ca: Option<PathBuf>,
    pub(crate) temp_dir: Option<PathBuf>,
    pub(crate) file_out: Option<PathBuf>,
    pub(crate) file_append: Option<bool>,
    pub(crate) body_limit: Option<u64>,
    pub(crate) proxy: Option<String>,
    pub(crate) auth: Option<String>,
    pub(crate) send_progress: Option<ProgressFn>,
    pub(crate) send_step: Option<f64>,
    pub(crate) recv_progress: Option<ProgressFn>,
    pub(crate) recv_step: Option<f64>,
    pub(crate) connection_timeout: Option<u64>,
    pub(crate) request_timeout: Option<u64>,
    pub(crate) nb_threads: Option<usize>,
    pub(crate) read_buffer_size: Option<usize>,
    pub(crate) write_buffer_size: Option<usize>,
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// CA bundle used to verify the server certificate. Without it, TLS
    /// connections accept any certificate.
    #[must_use]
    pub fn ca(mut self, ca: impl Into<PathBuf>) -> Self {
        self.ca = Some(ca.into());
        self
    }

    /// Directory receiving file-backed response bodies. Defaults to the
    /// system temp directory.
    #[must_use]
    pub fn temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    /// Exact output path for a file-backed response body.
    #[must_use]
    pub fn file_out(mut self, file_out: impl Into<PathBuf>) -> Self {
        self.file_out = Some(file_out.into());
        self
    }

    /// Append to an existing output file instead of truncating it.
    #[must_use]
    pub fn file_append(mut self, file_append: bool) -> Self {
        self.file_append = Some(file_append);
        self
    }

    /// Maximum accepted response body size in bytes.
    #[must_use]
    pub fn body_limit(mut self, body_limit: u64) -> Self {
        self.body_limit = Some(body_limit);
        self
    }

    /// Prefix prepended to the request target (absolute-form proxying).
    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Ready-to-send `Authorization` header value; see the `auth` helpers.
    #[must_use]
    pub fn auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Upload progress callback, reported every [`DEFAULT_PROGRESS_STEP`]
    /// unless a step was set explicitly.
    #[must_use]
    pub fn send_progress<F>(mut self, send_progress: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.send_progress = Some(Arc::new(send_progress));
        if self.send_step.is_none() {
            self.send_step = Some(DEFAULT_PROGRESS_STEP);
        }
        self
    }

    /// Fraction of the payload between two upload progress reports.
    #[must_use]
    pub fn send_step(mut self, send_step: f64) -> Self {
        self.send_step = Some(send_step);
        self
    }

    /// Download progress callback, reported every [`DEFAULT_PROGRESS_STEP`]
    /// unless a step was set explicitly.
    #[must_use]
    pub fn recv_progress<F>(mut self, recv_progress: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.recv_progress = Some(Arc::new(recv_progress));
        if self.recv_step.is_none() {
            self.recv_step = Some(DEFAULT_PROGRESS_STEP);
        }
        self
    }

    /// Fraction of the payload between two download progress reports.
    #[must_use]
    pub fn recv_step(mut self, recv_step: f64) -> Self {
        self.recv_step = Some(recv_step);
        self
    }

    /// Deadline for establishing the TCP connection, in milliseconds.
    #[must_use]
    pub fn connection_timeout(mut self, connection_timeout_ms: u64) -> Self {
        self.connection_timeout = Some(connection_timeout_ms);
        self
    }

    /// Deadline re-armed before every read/write step, in milliseconds.
    #[must_use]
    pub fn request_timeout(mut self, request_timeout_ms: u64) -> Self {
        self.request_timeout = Some(request_timeout_ms);
        self
    }

    /// Worker threads for the client event loop (client-level only).
    #[must_use]
    pub fn nb_threads(mut self, nb_threads: usize) -> Self {
        self.nb_threads = Some(nb_threads);
        self
    }

    /// Socket read chunk size in bytes.
    #[must_use]
    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = Some(read_buffer_size);
        self
    }

    /// Body write chunk size in bytes.
    #[must_use]
    pub fn write_buffer_size(mut self, write_buffer_size: usize) -> Self {
        self.write_buffer_size = Some(write_buffer_size);
        self
    }

    /// Layer `over` on top of `base`: each field takes the override's value
    /// when set, the base's otherwise.
    #[must_use]
    pub fn merge(base: &Options, over: &Options) -> Options {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.as_ref().or(base.as_ref()).cloned()
        }

        Options {
            ca: pick(&base.ca, &over.ca),
            temp_dir: pick(&base.temp_dir, &over.temp_dir),
            file_out: pick(&base.file_out, &over.file_out),
            file_append: pick(&base.file_append, &over.file_append),
            body_limit: pick(&base.body_limit, &over.body_limit),
            proxy: pick(&base.proxy, &over.proxy),
            auth: pick(&base.auth, &over.auth),
            send_progress: pick(&base.send_progress, &over.send_progress),
            send_step: pick(&base.send_step, &over.send_step),
            recv_progress: pick(&base.recv_progress, &over.recv_progress),
            recv_step: pick(&base.recv_step, &over.recv_step),
            connection_timeout: pick(&base.connection_timeout, &over.connection_timeout),
            request_timeout: pick(&base.request_timeout, &over.request_timeout),
            nb_threads: pick(&base.nb_threads, &over.nb_threads),
            read_buffer_size: pick(&base.read_buffer_size, &over.read_buffer_size),
            write_buffer_size: pick(&base.write_buffer_size, &over.write_buffer_size),
        }
    }

    pub(crate) fn write_chunk_size(&self) -> usize {
        self.write_buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    pub(crate) fn read_chunk_size(&self) -> usize {
        self.read_buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("ca", &self.ca)
            .field("temp_dir", &self.temp_dir)
            .field("file_out", &self.file_out)
            .field("file_append", &self.file_append)
            .field("body_limit", &self.body_limit)
            .field("proxy", &self.proxy)
            .field("auth", &self.auth.as_ref().map(|_| "<set>"))
            .field("send_progress", &self.send_progress.as_ref().map(|_| "<fn>"))
            .field("send_step", &self.send_step)
            .field("recv_progress", &self.recv_progress.as_ref().map(|_| "<fn>"))
            .field("recv_step", &self.recv_step)
            .field("connection_timeout", &self.connection_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("nb_threads", &self.nb_threads)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .finish()
    }
}
