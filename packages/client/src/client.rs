//! Client core: base URL, owned event loop and session registry
//!
//! The core owns a fixed-size multi-thread runtime shared by every session.
//! Live sessions are tracked by identifier for cancellation routing; the
//! registry holds the only strong control-handle reference and drops it at
//! the session's terminal transition. Shutdown stops accepting work and
//! joins the workers; it runs implicitly when the last handle is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use regex::Regex;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;

use crate::error::{self, Error, Result};
use crate::options::{Options, DEFAULT_NB_THREADS};
use crate::request::RequestParts;
use crate::response::Response;
use crate::session::{Session, SessionCtl, SessionId};

const DEFAULT_PLAIN_PORT: u16 = 80;
const DEFAULT_TLS_PORT: u16 = 443;

static HOST_PORT_SCHEME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:(http|https)://)?([a-z0-9\-\.]+)(?::(\d+))?$").ok());

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct BaseUrl {
    pub(crate) tls: bool,
    pub(crate) host: String,
    pub(crate) port: u16,
}

/// Parse `(scheme://)?host(:port)?`, case-insensitively. `https` selects TLS
/// and port 443, anything else port 80; an explicit port always wins. Input
/// that does not match is tolerated: the empty host surfaces as a connect
/// failure once a request actually runs.
pub(crate) fn parse_base_url(url: &str) -> BaseUrl {
    let url = url.trim().to_ascii_lowercase();
    let mut base = BaseUrl {
        tls: false,
        host: String::new(),
        port: DEFAULT_PLAIN_PORT,
    };
    let Some(pattern) = HOST_PORT_SCHEME.as_ref() else {
        return base;
    };
    match pattern.captures(&url) {
        Some(caps) => {
            base.tls = caps.get(1).is_some_and(|m| m.as_str() == "https");
            base.host = caps.get(2).map(|m| m.as_str().to_owned()).unwrap_or_default();
            base.port = if base.tls { DEFAULT_TLS_PORT } else { DEFAULT_PLAIN_PORT };
            if let Some(port) = caps.get(3) {
                if let Ok(port) = port.as_str().parse() {
                    base.port = port;
                }
            }
        }
        None => {
            tracing::warn!("base url {url:?} did not parse; requests will fail to connect");
        }
    }
    base
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub struct ClientCore {
    tls: bool,
    host: String,
    port: u16,
    options: Options,
    runtime: Mutex<Option<Runtime>>,
    sessions: Mutex<HashMap<SessionId, Arc<SessionCtl>>>,
}

impl ClientCore {
    /// Parse the base url and start the worker pool.
    pub fn new(url: &str, options: Options) -> Result<Arc<Self>> {
        let base = parse_base_url(url);
        let nb_threads = options.nb_threads.unwrap_or(DEFAULT_NB_THREADS).max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(nb_threads)
            .thread_name("wyre-worker")
            .enable_io()
            .enable_time()
            .build()
            .map_err(error::builder)?;
        tracing::debug!(
            host = %base.host,
            port = base.port,
            tls = base.tls,
            workers = nb_threads,
            "client created"
        );
        Ok(Arc::new(ClientCore {
            tls: base.tls,
            host: base.host,
            port: base.port,
            options,
            runtime: Mutex::new(Some(runtime)),
            sessions: Mutex::new(HashMap::new()),
        }))
    }

    /// Merge options, register a session and dispatch it onto the event
    /// loop. A deferred builder error, or a client that was already shut
    /// down, resolves the returned handle immediately.
    pub fn send(self: &Arc<Self>, parts: RequestParts, build_error: Option<Error>) -> PendingResponse {
        let (slot, rx) = oneshot::channel();
        let ctl = Arc::new(SessionCtl::new());
        let id = ctl.id();

        if let Some(error) = build_error {
            let mut response = Response::default();
            response.mark_failed("Failed to create request", &error);
            let _ = slot.send(response);
            return PendingResponse {
                id,
                rx,
                core: Arc::downgrade(self),
            };
        }

        let options = Options::merge(&self.options, &parts.options);
        let runtime = lock(&self.runtime);
        match runtime.as_ref() {
            Some(runtime) => {
                lock(&self.sessions).insert(id, ctl.clone());
                let session = Session::new(
                    ctl,
                    Arc::downgrade(self),
                    self.host.clone(),
                    self.port,
                    self.tls,
                    options,
                    parts,
                    slot,
                );
                runtime.spawn(session.run());
                tracing::debug!(%id, "session dispatched");
            }
            None => {
                // Shut down: no response will ever arrive, resolve now.
                let _ = slot.send(Response::default());
            }
        }
        PendingResponse {
            id,
            rx,
            core: Arc::downgrade(self),
        }
    }

    /// Cancel one live session. A no-op when the id is unknown — it may
    /// simply have completed already.
    pub fn cancel(&self, id: SessionId) {
        if let Some(ctl) = lock(&self.sessions).get(&id) {
            ctl.cancel();
            tracing::debug!(%id, "cancel requested");
        }
    }

    /// Cancel every currently registered session.
    pub fn cancel_all(&self) {
        for ctl in lock(&self.sessions).values() {
            ctl.cancel();
        }
    }

    pub(crate) fn remove_session(&self, id: SessionId) {
        lock(&self.sessions).remove(&id);
    }

    /// Stop accepting new work and wind the worker pool down. Idempotent.
    pub fn shutdown(&self) {
        if let Some(runtime) = lock(&self.runtime).take() {
            tracing::debug!("client shutting down");
            if tokio::runtime::Handle::try_current().is_ok() {
                // A worker cannot join its own pool; detach instead.
                runtime.shutdown_background();
            } else {
                // Dropping the runtime joins the worker threads.
                drop(runtime);
            }
        }
    }
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCore")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("live_sessions", &lock(&self.sessions).len())
            .finish()
    }
}

/// Handle to a dispatched request: a one-shot result slot plus the session
/// id for cancellation routing. Await it, or block the calling thread with
/// [`wait`](PendingResponse::wait).
#[derive(Debug)]
pub struct PendingResponse {
    id: SessionId,
    rx: oneshot::Receiver<Response>,
    core: Weak<ClientCore>,
}

impl PendingResponse {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Request cooperative cancellation; takes effect at the session's next
    /// suspension point. A no-op once the session has completed.
    pub fn cancel(&self) {
        if let Some(core) = self.core.upgrade() {
            core.cancel(self.id);
        }
    }

    /// Block the calling thread until the terminal response. Must not be
    /// called from an event-loop worker; it never blocks one.
    #[must_use]
    pub fn wait(self) -> Response {
        self.rx.blocking_recv().unwrap_or_default()
    }
}

impl Future for PendingResponse {
    type Output = Response;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|result| result.unwrap_or_default())
    }
}
