//! One upgraded connection, from handshake to teardown.
//!
//! # Data Flow
//! ```text
//! HTTP session hands over socket + upgrade request
//!     → handshake (101 or 400)
//!     → register outbox, fire Connected
//!     → loop: read message → message handler
//!             outbox item  → write (one at a time)
//!     → unregister, fire Disconnected, drop socket
//! ```

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use crate::http::request::Request;
use crate::lifecycle::ShutdownSignal;
use crate::net::connection::{ConnectionGuard, ConnectionId};
use crate::net::in_flight::InFlightWriter;
use crate::net::listener::ConnectionPermit;
use crate::observability::metrics;
use crate::server::ServerContext;
use crate::websocket::handle::{ConnectionHandle, ConnectionState, WsOutbound};
use crate::websocket::handshake;
use crate::websocket::registry::Outbox;

/// How long to wait for the other side of the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<TcpStream>;
type WsWriter = InFlightWriter<SplitSink<WsStream, Message>, tungstenite::Error>;

/// How the open phase ended.
#[derive(Debug)]
enum Ending {
    /// Close frame received or stream ended.
    PeerClosed,
    /// Our own close frame was written.
    LocalClose,
    /// Server shutdown.
    Cancelled,
    Failed(tungstenite::Error),
}

pub(crate) struct WebSocketConnection {
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    shutdown: ShutdownSignal,
}

impl WebSocketConnection {
    pub(crate) fn new(
        guard: ConnectionGuard,
        permit: ConnectionPermit,
        peer: SocketAddr,
        ctx: Arc<ServerContext>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            guard,
            _permit: permit,
            peer,
            ctx,
            shutdown,
        }
    }

    fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    /// Run the connection to completion on the current task.
    ///
    /// `buffered` holds bytes the client sent after the upgrade request.
    pub(crate) async fn run(mut self, stream: TcpStream, request: Request, buffered: BytesMut) {
        let id = self.id();
        let config = &self.ctx.config;
        let accept = handshake::accept(
            stream,
            &request,
            buffered,
            &config.http.server_name,
            &config.websocket,
        );

        let ws = tokio::select! {
            _ = self.shutdown.recv() => return,
            result = accept => match result {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::debug!(connection_id = %id, peer_addr = %self.peer, error = %e, "WebSocket handshake failed");
                    return;
                }
            },
        };

        let outbox = Arc::new(Outbox::new(self.ctx.config.websocket.queue_capacity));
        self.ctx.registry.insert(id, Arc::clone(&outbox));
        metrics::websocket_opened();
        tracing::info!(
            connection_id = %id,
            peer_addr = %self.peer,
            path = %request.uri().path(),
            "WebSocket connection open"
        );
        self.notify(ConnectionState::Connected);

        let (sink, mut stream) = ws.split();
        let mut writer = InFlightWriter::new(sink);
        let ending = self.serve(&mut stream, &mut writer, &outbox).await;
        if matches!(ending, Ending::PeerClosed | Ending::LocalClose) {
            self.finish_close(&mut stream).await;
        }

        let first = outbox.begin_close();
        self.ctx.registry.remove(id);
        metrics::websocket_closed();
        match &ending {
            Ending::Cancelled => {}
            Ending::PeerClosed | Ending::LocalClose => {
                tracing::debug!(connection_id = %id, reason = ?ending, "WebSocket connection closed");
            }
            Ending::Failed(e) => {
                tracing::warn!(connection_id = %id, peer_addr = %self.peer, error = %e, "WebSocket connection failed");
            }
        }
        if first {
            self.notify(ConnectionState::Disconnected);
        }
        drop(writer);
        drop(stream);
    }

    async fn serve(
        &mut self,
        stream: &mut SplitStream<WsStream>,
        writer: &mut WsWriter,
        outbox: &Outbox,
    ) -> Ending {
        let mut closing_write = false;
        loop {
            if writer.is_idle() {
                if let Some(item) = outbox.take_next() {
                    closing_write = item.close_after;
                    let message = match item.message {
                        WsOutbound::Text(text) => {
                            metrics::record_ws_message("out");
                            Message::text(text)
                        }
                        WsOutbound::Close => Message::Close(None),
                    };
                    writer.start(move |mut sink| async move {
                        let result = sink.send(message).await;
                        (sink, result)
                    });
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => return Ending::Cancelled,
                _ = outbox.notified(), if writer.is_idle() => {}
                result = writer.completion() => {
                    outbox.on_write_complete();
                    if let Err(e) = result {
                        return Ending::Failed(e);
                    }
                    if closing_write {
                        return Ending::LocalClose;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => {
                        self.dispatch(String::from_utf8_lossy(&data).into_owned())
                    }
                    Some(Ok(Message::Close(_))) | None => return Ending::PeerClosed,
                    Some(Ok(_)) => {}
                    Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                        return Ending::PeerClosed
                    }
                    Some(Err(e)) => return Ending::Failed(e),
                },
            }
        }
    }

    /// Complete the closing handshake.
    ///
    /// Reading flushes the Close reply tungstenite queued for the peer, or
    /// waits for the peer's reply to ours. Ends once the stream is done.
    async fn finish_close(&mut self, stream: &mut SplitStream<WsStream>) {
        let drain = async { while let Some(Ok(_)) = stream.next().await {} };
        tokio::select! {
            _ = self.shutdown.recv() => {}
            _ = tokio::time::timeout(CLOSE_TIMEOUT, drain) => {}
        }
    }

    fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(self.id(), Arc::clone(&self.ctx.registry))
    }

    fn dispatch(&self, text: String) {
        metrics::record_ws_message("in");
        let Some(handler) = &self.ctx.callbacks.message else {
            return;
        };
        let handle = self.handle();
        if panic::catch_unwind(AssertUnwindSafe(|| handler(handle, text))).is_err() {
            tracing::error!(connection_id = %self.id(), "Message handler panicked");
        }
    }

    fn notify(&self, state: ConnectionState) {
        let Some(handler) = &self.ctx.callbacks.connection else {
            return;
        };
        let handle = self.handle();
        if panic::catch_unwind(AssertUnwindSafe(|| handler(handle, state))).is_err() {
            tracing::error!(connection_id = %self.id(), state = ?state, "Connection handler panicked");
        }
    }
}
