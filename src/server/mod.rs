//! Server facade: configuration, callbacks, runtime and lifecycle.
//!
//! # Data Flow
//! ```text
//! Server::new(config)
//!     → on_request / on_message / on_connection
//!     → start(): build runtime, bind, install signal handlers
//!         → Listener::serve (until shutdown)
//!         → wait for live connections (bounded)
//!     → runtime shut down, workers joined
//! ```

mod callbacks;
mod context;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{validate_config, ConfigError, ServerConfig};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::lifecycle::Shutdown;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::websocket::{ConnectionHandle, ConnectionRegistry, ConnectionState};

pub use callbacks::{Callbacks, MessageHandler, RequestHandler, StateHandler};
pub use context::ServerContext;

/// How long `run` waits for open connections after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A combined HTTP and WebSocket server.
///
/// Register callbacks, then call [`Server::start`] (blocking, owns its
/// runtime) or [`Server::run`] (inside an existing runtime).
pub struct Server {
    config: ServerConfig,
    callbacks: Callbacks,
    registry: Arc<ConnectionRegistry>,
    shutdown: Shutdown,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            callbacks: Callbacks::default(),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: Shutdown::new(),
        }
    }

    /// Set the request handler. Without one, files are served from the
    /// configured document root.
    pub fn on_request<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.callbacks.request = Some(Arc::new(handler));
        self
    }

    /// Set the WebSocket message handler. No reply is sent unless the
    /// handler calls [`ConnectionHandle::send`].
    pub fn on_message<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ConnectionHandle, String) + Send + Sync + 'static,
    {
        self.callbacks.message = Some(Arc::new(handler));
        self
    }

    pub fn on_connection<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ConnectionHandle, ConnectionState) + Send + Sync + 'static,
    {
        self.callbacks.connection = Some(Arc::new(handler));
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live WebSocket connections.
    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Trigger for stopping a server started with [`Server::run`].
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run on a dedicated multi-thread runtime until SIGINT or SIGTERM.
    ///
    /// Blocks the calling thread; returns after all workers have stopped.
    pub fn start(self) -> Result<(), ServerError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;

        let threads = self.config.listener.worker_threads();
        let runtime = build_runtime(threads).map_err(ServerError::Runtime)?;

        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            worker_threads = threads,
            "Server starting"
        );

        runtime.block_on(async move {
            let observability = &self.config.observability;
            if observability.metrics_enabled {
                match observability.metrics_address.parse() {
                    Ok(addr) => metrics::init_metrics(addr),
                    Err(_) => tracing::error!(
                        metrics_address = %observability.metrics_address,
                        "Failed to parse metrics address"
                    ),
                }
            }

            let listener = Listener::bind(&self.config.listener).await?;
            let _signals = spawn_signal_listener(self.shutdown.clone());
            self.serve(listener).await;
            Ok::<_, ServerError>(())
        })?;

        runtime.shutdown_timeout(Duration::from_secs(1));
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Serve on an already bound socket until the shutdown handle fires.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;
        let listener = Listener::from_tcp(listener, self.config.listener.max_connections)?;
        self.serve(listener).await;
        Ok(())
    }

    async fn serve(self, listener: Listener) {
        let ctx = Arc::new(ServerContext::new(
            self.config,
            self.callbacks,
            self.registry,
            self.shutdown,
        ));

        listener.serve(Arc::clone(&ctx)).await;

        if !ctx.tracker.wait_idle(DRAIN_TIMEOUT).await {
            tracing::warn!(
                remaining = ctx.tracker.active_count(),
                "Connections still open after shutdown"
            );
        }
    }
}

/// Runtime for `threads` threads in total, the calling thread included.
///
/// A single thread gets a current-thread runtime driven by `block_on`.
/// Otherwise the caller drives the accept loop and `threads - 1` workers
/// run the connections.
fn build_runtime(threads: usize) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = if threads <= 1 {
        tokio::runtime::Builder::new_current_thread()
    } else {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.worker_threads(threads - 1);
        builder
    };
    builder.thread_name("http-ws-worker").enable_all().build()
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("connections", &self.registry.len())
            .finish()
    }
}
