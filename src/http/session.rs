//! One accepted TCP connection speaking HTTP/1.x.
//!
//! # Data Flow
//! ```text
//! read request ──upgrade?──► stop reading, flush queue, hand socket to
//!      │                     WebSocketConnection
//!      ▼
//! request handler (or static files) → encode → write queue
//!      │                                         │ one write in flight
//!      └── keep reading while queue has room ◄───┘ completion
//! ```
//!
//! # Design Decisions
//! - Reads and the single in-flight write are multiplexed with `select!`,
//!   so pipelined requests are read while earlier responses are written
//! - Reading pauses while the write queue is full and resumes on the
//!   completion that frees a slot
//! - A response marked close stops further reads; responses already queued
//!   are still written, then the write side is shut down and the peer is
//!   drained for a bounded linger period
//! - The socket either closes here or moves to exactly one WebSocket
//!   connection

use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::http::files;
use crate::http::request::{is_upgrade, keep_alive, Request, RequestError, RequestLimits, RequestReader};
use crate::http::response::{write_response, EncodedResponse, Response, ResponseContext, ResponseKind};
use crate::lifecycle::ShutdownSignal;
use crate::net::connection::{ConnectionGuard, ConnectionId};
use crate::net::in_flight::InFlightWriter;
use crate::net::listener::ConnectionPermit;
use crate::net::write_queue::{WriteItem, WriteQueue};
use crate::observability::metrics;
use crate::server::ServerContext;
use crate::websocket::WebSocketConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Reading,
    /// Write queue full.
    Paused,
    /// No more requests will be read on this socket.
    Stopped,
}

#[derive(Debug)]
enum Outcome {
    Close,
    Upgrade(Request),
    Cancelled,
    Failed(io::Error),
}

/// State of one HTTP connection, driven by [`HttpSession::run`].
pub struct HttpSession {
    guard: ConnectionGuard,
    permit: ConnectionPermit,
    peer: SocketAddr,
    reader: RequestReader<OwnedReadHalf>,
    writer: InFlightWriter<OwnedWriteHalf, io::Error>,
    queue: WriteQueue<WriteItem<EncodedResponse>>,
    /// The in-flight item closes the connection once written.
    closing_write: bool,
    state: ReadState,
    upgrade: Option<Request>,
    ctx: Arc<ServerContext>,
    shutdown: ShutdownSignal,
}

impl HttpSession {
    pub fn new(stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit, ctx: Arc<ServerContext>) -> Self {
        let guard = ctx.tracker.track();
        let shutdown = ctx.shutdown.subscribe();
        let (read_half, write_half) = stream.into_split();
        let http = &ctx.config.http;

        Self {
            guard,
            permit,
            peer,
            reader: RequestReader::new(read_half, RequestLimits::from(http)),
            writer: InFlightWriter::new(write_half),
            queue: WriteQueue::new(http.queue_capacity),
            closing_write: false,
            state: ReadState::Reading,
            upgrade: None,
            ctx,
            shutdown,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    /// Serve requests until the connection closes or is upgraded.
    pub async fn run(mut self) {
        let id = self.id();
        metrics::session_opened();
        tracing::debug!(connection_id = %id, peer_addr = %self.peer, "HTTP session started");

        let outcome = self.drive().await;
        metrics::session_closed();

        match outcome {
            Outcome::Close => self.close().await,
            Outcome::Upgrade(request) => self.upgrade(request).await,
            Outcome::Cancelled => {}
            Outcome::Failed(e) => match e.kind() {
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionAborted => {
                    tracing::debug!(connection_id = %id, error = %e, "Peer dropped connection");
                }
                _ => {
                    tracing::warn!(connection_id = %id, peer_addr = %self.peer, error = %e, "HTTP session I/O error");
                }
            },
        }
    }

    async fn drive(&mut self) -> Outcome {
        loop {
            self.pump();

            if self.state == ReadState::Stopped && self.queue.is_empty() {
                return match self.upgrade.take() {
                    Some(request) => Outcome::Upgrade(request),
                    None => Outcome::Close,
                };
            }

            tokio::select! {
                _ = self.shutdown.recv() => return Outcome::Cancelled,
                result = self.writer.completion() => {
                    let was_full = self.queue.on_write_complete();
                    if let Err(e) = result {
                        return Outcome::Failed(e);
                    }
                    if self.closing_write {
                        return Outcome::Close;
                    }
                    if was_full && self.state == ReadState::Paused {
                        tracing::trace!(connection_id = %self.id(), "Resuming reads");
                        self.state = ReadState::Reading;
                    }
                }
                result = self.reader.read_request(), if self.state == ReadState::Reading => {
                    if let Some(outcome) = self.on_read(result).await {
                        return outcome;
                    }
                }
            }
        }
    }

    /// Start writing the next queued response if the socket is free.
    fn pump(&mut self) {
        if !self.writer.is_idle() {
            return;
        }
        let Some(item) = self.queue.take_next() else {
            return;
        };
        self.closing_write = item.close_after;
        let response = item.message;
        self.writer.start(move |mut io| async move {
            let result = write_response(&mut io, response).await;
            (io, result)
        });
    }

    async fn on_read(&mut self, result: Result<Request, RequestError>) -> Option<Outcome> {
        match result {
            Ok(request) => self.on_request(request).await,
            Err(RequestError::PeerClosed | RequestError::UnexpectedEof) => {
                self.state = ReadState::Stopped;
                None
            }
            Err(RequestError::Io(e)) => Some(Outcome::Failed(e)),
            Err(e) => {
                let status = e.status().unwrap_or(StatusCode::BAD_REQUEST);
                tracing::debug!(
                    connection_id = %self.id(),
                    error = %e,
                    status = status.as_u16(),
                    "Rejecting request"
                );
                let ctx = ResponseContext::for_protocol_error(&self.ctx.config.http.server_name);
                self.state = ReadState::Stopped;
                self.respond(ctx.text(status, e.to_string(), "text/plain"), true)
            }
        }
    }

    async fn on_request(&mut self, request: Request) -> Option<Outcome> {
        if is_upgrade(&request) {
            tracing::debug!(connection_id = %self.id(), path = %request.uri().path(), "Upgrade requested");
            self.state = ReadState::Stopped;
            self.upgrade = Some(request);
            return None;
        }

        let start = Instant::now();
        let response = self.call_handler(&request);
        let close = !keep_alive(&request) || response.close;
        let ctx = ResponseContext::for_request(&request, !close, &self.ctx.config.http.server_name);

        let encoded = match response.kind {
            ResponseKind::String { text, content_type } => ctx.text(response.status, text, &content_type),
            ResponseKind::File { path } => files::open_file(&ctx, &request.uri().to_string(), &path).await,
        };

        metrics::record_request(request.method().as_str(), encoded.status.as_u16(), start);
        tracing::debug!(
            connection_id = %self.id(),
            method = %request.method(),
            path = %request.uri().path(),
            status = encoded.status.as_u16(),
            close,
            "Request handled"
        );

        if close {
            self.state = ReadState::Stopped;
        }
        self.respond(encoded, close)
    }

    fn call_handler(&self, request: &Request) -> Response {
        let Some(handler) = &self.ctx.callbacks.request else {
            return files::default_response(&self.ctx.config.http.document_root, request);
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(request))) {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(
                    connection_id = %self.id(),
                    path = %request.uri().path(),
                    "Request handler panicked"
                );
                Response::html("An error occurred: 'request handler panicked'")
                    .with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn respond(&mut self, response: EncodedResponse, close: bool) -> Option<Outcome> {
        let item = if close {
            WriteItem::closing(response)
        } else {
            WriteItem::new(response)
        };

        // reads pause while full, so this only trips on a logic error
        if !self.queue.enqueue(item) {
            metrics::record_queue_full("http");
            tracing::error!(connection_id = %self.id(), "Response refused by full write queue");
            return Some(Outcome::Close);
        }

        if self.queue.is_full() && self.state == ReadState::Reading {
            tracing::trace!(connection_id = %self.id(), "Write queue full, pausing reads");
            self.state = ReadState::Paused;
        }
        None
    }

    /// Half-close, then let the peer's remaining bytes drain.
    async fn close(self) {
        let id = self.id();
        let linger = self.ctx.config.http.linger();
        let Self { mut reader, writer, .. } = self;

        if let Some(mut io) = writer.into_inner() {
            let _ = io.shutdown().await;
        }
        let _ = tokio::time::timeout(linger, reader.drain()).await;
        tracing::debug!(connection_id = %id, "HTTP session closed");
    }

    async fn upgrade(self, request: Request) {
        let Self {
            guard,
            permit,
            peer,
            reader,
            writer,
            ctx,
            shutdown,
            ..
        } = self;

        let Some(write_half) = writer.into_inner() else {
            return;
        };
        let (read_half, buffered) = reader.into_parts();
        let stream = match read_half.reunite(write_half) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(connection_id = %guard.id(), error = %e, "Failed to reunite socket halves");
                return;
            }
        };

        WebSocketConnection::new(guard, permit, peer, ctx, shutdown)
            .run(stream, request, buffered)
            .await;
    }
}
