//! Per-request session pipeline
//!
//! One session drives exactly one request to exactly one response over one
//! dedicated connection:
//! resolve → connect → [handshake] → write request → read header → read body.
//! Each step is a suspension point; after every one the cancellation flag is
//! checked before the step's own outcome is examined, so a cancellation that
//! races an I/O error wins. Exactly one terminal path fulfills the result
//! slot, tears the transport down and removes the session from the client's
//! registry.

pub(crate) mod progress;
pub(crate) mod transport;

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::body::decode::{decode_kind, BodySink};
use crate::body::encode::EncodedBody;
use crate::body::Content;
use crate::client::ClientCore;
use crate::error::{self, Error};
use crate::h1::{self, BodyFraming, ChunkedDecoder};
use crate::options::Options;
use crate::random::fast_random;
use crate::request::RequestParts;
use crate::response::Response;
use progress::Progress;
use transport::Transport;

const USER_AGENT_VALUE: &str = concat!("wyre/", env!("CARGO_PKG_VERSION"));

/// Identifier of one in-flight request attempt, unique per `send`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SessionId(u128);

impl SessionId {
    pub(crate) fn generate() -> Self {
        SessionId((u128::from(fast_random()) << 64) | u128::from(fast_random()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Shared control handle for a live session: its identity plus the
/// cooperative cancellation flag. The registry holds the only strong
/// reference besides the running task itself.
pub(crate) struct SessionCtl {
    id: SessionId,
    cancel: AtomicBool,
}

impl SessionCtl {
    pub(crate) fn new() -> Self {
        SessionCtl {
            id: SessionId::generate(),
            cancel: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// How the pipeline left its happy path.
enum Abort {
    Canceled,
    Failed { context: String, error: Error },
}

fn fail<T>(context: impl Into<String>, error: Error) -> Result<T, Abort> {
    Err(Abort::Failed {
        context: context.into(),
        error,
    })
}

async fn with_deadline<T, E>(
    deadline_ms: Option<u64>,
    on_timeout: impl FnOnce() -> E,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, E> {
    match deadline_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout()),
        },
        None => fut.await,
    }
}

fn timed_out() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out")
}

pub(crate) struct Session {
    ctl: Arc<SessionCtl>,
    core: Weak<ClientCore>,
    host: String,
    port: u16,
    tls: bool,
    options: Options,
    parts: RequestParts,
    slot: Option<oneshot::Sender<Response>>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ctl: Arc<SessionCtl>,
        core: Weak<ClientCore>,
        host: String,
        port: u16,
        tls: bool,
        options: Options,
        parts: RequestParts,
        slot: oneshot::Sender<Response>,
    ) -> Self {
        Session {
            ctl,
            core,
            host,
            port,
            tls,
            options,
            parts,
            slot: Some(slot),
        }
    }

    /// Drive the request to its terminal state and fulfill the result slot.
    pub(crate) async fn run(mut self) {
        let mut response = Response::default();
        let mut transport: Option<Transport> = None;

        let outcome = self.pipeline(&mut response, &mut transport).await;

        // Graceful teardown on every terminal path; errors here are moot.
        if let Some(t) = transport.as_mut() {
            let _ = t.shutdown().await;
        }

        match outcome {
            Ok(()) => {
                tracing::debug!(id = %self.ctl.id(), status = response.status, "session completed");
            }
            Err(Abort::Canceled) => {
                response.mark_canceled();
                tracing::debug!(id = %self.ctl.id(), "session canceled");
            }
            Err(Abort::Failed { context, error }) => {
                response.mark_failed(&context, &error);
                tracing::debug!(id = %self.ctl.id(), %context, %error, "session failed");
            }
        }

        if let Some(core) = self.core.upgrade() {
            core.remove_session(self.ctl.id());
        }
        if let Some(slot) = self.slot.take() {
            // The receiver may already be gone; the terminal state stands.
            let _ = slot.send(response);
        }
    }

    async fn pipeline(
        &self,
        response: &mut Response,
        transport_slot: &mut Option<Transport>,
    ) -> Result<(), Abort> {
        let authority = format!("{}:{}", self.host, self.port);

        // Resolve
        let resolved = tokio::net::lookup_host(authority.as_str()).await;
        self.check_cancel()?;
        let addrs: Vec<SocketAddr> = match resolved {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                return fail(format!("Failed to resolve {authority}"), error::resolve(e));
            }
        };
        if addrs.is_empty() {
            return fail(
                format!("Failed to resolve {authority}"),
                error::resolve(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses resolved",
                )),
            );
        }
        tracing::debug!(id = %self.ctl.id(), count = addrs.len(), "resolved {authority}");

        // Connect
        let connected = with_deadline(
            self.options.connection_timeout,
            timed_out,
            connect_any(&addrs),
        )
        .await;
        self.check_cancel()?;
        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                return fail(format!("Failed to connect to {authority}"), error::connect(e));
            }
        };

        // Handshake (TLS variant only)
        let transport = if self.tls {
            let handshaken = with_deadline(
                self.options.connection_timeout,
                || error::handshake(timed_out()),
                Transport::handshake(stream, &self.host, self.options.ca.as_deref()),
            )
            .await;
            self.check_cancel()?;
            match handshaken {
                Ok(transport) => transport,
                Err(e) => return fail("Socket handshake failed", e),
            }
        } else {
            Transport::Plain(stream)
        };
        let transport = transport_slot.insert(transport);

        // WriteRequest
        let encoded = match EncodedBody::open(&self.parts.content).await {
            Ok(encoded) => encoded,
            Err(e) => return fail("Failed to create request", e),
        };
        let headers = self.build_headers(&encoded);
        let head = h1::render_request_head(&self.parts.method, &self.request_target(), &headers);

        let written = self.timed_io(transport.write_all(&head)).await;
        self.check_cancel()?;
        if let Err(e) = written {
            return fail("Socket write failed", error::transfer(e));
        }

        let mut send_progress = Progress::new(
            self.options.send_progress.clone(),
            self.options.send_step,
            Some(encoded.content_length),
        );
        let mut body = encoded.stream;
        let chunk_size = self.options.write_chunk_size();
        let mut wrote_chunk = false;
        loop {
            self.check_cancel()?;
            let chunk = match body.next_chunk(chunk_size).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => return fail("Socket write failed", e),
            };
            let written = self.timed_io(transport.write_all(&chunk)).await;
            self.check_cancel()?;
            if let Err(e) = written {
                return fail("Socket write failed", error::transfer(e));
            }
            send_progress.record(chunk.len() as u64, body.is_done());
            wrote_chunk = true;
        }
        if !wrote_chunk {
            // Bodyless request: one completion report.
            send_progress.record(0, true);
        }
        let flushed = self.timed_io(transport.flush()).await;
        self.check_cancel()?;
        if let Err(e) = flushed {
            return fail("Socket write failed", error::transfer(e));
        }
        tracing::debug!(id = %self.ctl.id(), "request written");

        // WaitingHeader
        let mut buf = BytesMut::with_capacity(self.options.read_chunk_size());
        let head = loop {
            match h1::parse_response_head(&buf) {
                Ok(Some((head, len))) => {
                    buf.advance(len);
                    break head;
                }
                Ok(None) => {}
                Err(e) => return fail("Socket read header failed", e),
            }
            buf.reserve(self.options.read_chunk_size());
            let read = self.timed_io(transport.read_buf(&mut buf)).await;
            self.check_cancel()?;
            match read {
                Ok(0) => {
                    return fail(
                        "Socket read header failed",
                        error::transfer(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed before headers",
                        )),
                    );
                }
                Ok(_) => {}
                Err(e) => return fail("Socket read header failed", error::transfer(e)),
            }
        };
        tracing::debug!(id = %self.ctl.id(), status = head.status, "response headers read");

        // Sink selection is driven by the response's content type, never by
        // what the request sent.
        let framing = h1::body_framing(&head);
        if let (Some(limit), BodyFraming::ContentLength(len)) = (self.options.body_limit, framing) {
            if len > limit {
                return fail(
                    "Failed to create parser",
                    error::transfer(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "body limit exceeded",
                    )),
                );
            }
        }
        let sink = match BodySink::open(decode_kind(head.content_type()), &self.options).await {
            Ok(sink) => sink,
            Err(e) => return fail("Failed to create parser", e),
        };

        // ReadingBody
        let (content, temp_path) = self.read_body(transport, &mut buf, framing, sink).await?;

        // Completed
        response.status = head.status;
        response.reason = head.reason;
        response.body = content;
        response.temp_path = temp_path;
        Ok(())
    }

    /// Read the response body into `sink` under the selected framing. The
    /// sink is aborted (partial files deleted) on every non-completing exit.
    async fn read_body(
        &self,
        transport: &mut Transport,
        buf: &mut BytesMut,
        framing: BodyFraming,
        mut sink: BodySink,
    ) -> Result<(Content, Option<PathBuf>), Abort> {
        let total = match framing {
            BodyFraming::ContentLength(len) => Some(len),
            _ => None,
        };
        let mut recv_progress = Progress::new(
            self.options.recv_progress.clone(),
            self.options.recv_step,
            total,
        );
        let limit = self.options.body_limit;
        let chunk_size = self.options.read_chunk_size();
        let mut received: u64 = 0;

        macro_rules! abort_fail {
            ($context:expr, $error:expr) => {{
                sink.abort().await;
                return fail($context, $error);
            }};
        }

        match framing {
            BodyFraming::ContentLength(total) => {
                let mut remaining = total;
                while remaining > 0 {
                    if !buf.is_empty() {
                        let take = remaining.min(buf.len() as u64) as usize;
                        if let Err(e) = sink.write(&buf[..take]).await {
                            abort_fail!("Socket read failed", error::transfer(e));
                        }
                        buf.advance(take);
                        remaining -= take as u64;
                        received += take as u64;
                        recv_progress.record(take as u64, remaining == 0);
                        continue;
                    }
                    if self.ctl.is_canceled() {
                        sink.abort().await;
                        return Err(Abort::Canceled);
                    }
                    buf.reserve(chunk_size);
                    let read = self.timed_io(transport.read_buf(buf)).await;
                    if self.ctl.is_canceled() {
                        sink.abort().await;
                        return Err(Abort::Canceled);
                    }
                    match read {
                        Ok(0) => abort_fail!(
                            "Socket read failed",
                            error::transfer(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "connection closed mid-body",
                            ))
                        ),
                        Ok(_) => {}
                        Err(e) => abort_fail!("Socket read failed", error::transfer(e)),
                    }
                }
                if total == 0 {
                    recv_progress.record(0, true);
                }
            }
            BodyFraming::Chunked => {
                let mut decoder = ChunkedDecoder::new();
                loop {
                    let mut decoded = Vec::new();
                    if let Err(e) = decoder.decode(buf, &mut decoded) {
                        abort_fail!("Socket read failed", e);
                    }
                    if !decoded.is_empty() {
                        received += decoded.len() as u64;
                        if limit.is_some_and(|limit| received > limit) {
                            abort_fail!(
                                "Socket read failed",
                                error::transfer(std::io::Error::new(
                                    std::io::ErrorKind::InvalidData,
                                    "body limit exceeded",
                                ))
                            );
                        }
                        if let Err(e) = sink.write(&decoded).await {
                            abort_fail!("Socket read failed", error::transfer(e));
                        }
                    }
                    if decoder.is_done() {
                        break;
                    }
                    if self.ctl.is_canceled() {
                        sink.abort().await;
                        return Err(Abort::Canceled);
                    }
                    buf.reserve(chunk_size);
                    let read = self.timed_io(transport.read_buf(buf)).await;
                    if self.ctl.is_canceled() {
                        sink.abort().await;
                        return Err(Abort::Canceled);
                    }
                    match read {
                        Ok(0) => abort_fail!(
                            "Socket read failed",
                            error::transfer(std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "connection closed mid-body",
                            ))
                        ),
                        Ok(_) => {}
                        Err(e) => abort_fail!("Socket read failed", error::transfer(e)),
                    }
                }
            }
            BodyFraming::ReadToEof => {
                loop {
                    if !buf.is_empty() {
                        received += buf.len() as u64;
                        if limit.is_some_and(|limit| received > limit) {
                            abort_fail!(
                                "Socket read failed",
                                error::transfer(std::io::Error::new(
                                    std::io::ErrorKind::InvalidData,
                                    "body limit exceeded",
                                ))
                            );
                        }
                        if let Err(e) = sink.write(&buf[..]).await {
                            abort_fail!("Socket read failed", error::transfer(e));
                        }
                        buf.clear();
                    }
                    if self.ctl.is_canceled() {
                        sink.abort().await;
                        return Err(Abort::Canceled);
                    }
                    buf.reserve(chunk_size);
                    let read = self.timed_io(transport.read_buf(buf)).await;
                    if self.ctl.is_canceled() {
                        sink.abort().await;
                        return Err(Abort::Canceled);
                    }
                    match read {
                        // Peer close terminates an unframed body.
                        Ok(0) => break,
                        Ok(_) => {}
                        Err(e) => abort_fail!("Socket read failed", error::transfer(e)),
                    }
                }
            }
        }

        match sink.finish().await {
            Ok(pair) => Ok(pair),
            Err(e) => fail("Failed to finalize body", error::transfer(e)),
        }
    }

    fn check_cancel(&self) -> Result<(), Abort> {
        if self.ctl.is_canceled() {
            Err(Abort::Canceled)
        } else {
            Ok(())
        }
    }

    async fn timed_io<T>(
        &self,
        fut: impl Future<Output = std::io::Result<T>>,
    ) -> std::io::Result<T> {
        with_deadline(self.options.request_timeout, timed_out, fut).await
    }

    fn request_target(&self) -> String {
        match self.options.proxy.as_deref() {
            Some(prefix) => format!("{prefix}{}", self.parts.target),
            None => self.parts.target.clone(),
        }
    }

    /// Default headers first, caller headers after them so they can override,
    /// body-strategy headers last.
    fn build_headers(&self, encoded: &EncodedBody) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let authority = format!("{}:{}", self.host, self.port);
        if let Ok(value) = HeaderValue::from_str(&authority) {
            headers.insert(HOST, value);
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if let Some(auth) = self.options.auth.as_deref() {
            match HeaderValue::from_str(auth) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => {
                    tracing::warn!("ignoring malformed authorization value: {e}");
                }
            }
        }
        for (name, value) in &self.parts.headers {
            headers.insert(name, value.clone());
        }
        if let Some(content_type) = encoded.content_type.as_deref() {
            if let Ok(value) = HeaderValue::from_str(content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(encoded.content_length));
        headers
    }
}

async fn connect_any(addrs: &[SocketAddr]) -> std::io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no usable address")
    }))
}
