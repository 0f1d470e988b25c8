//! Combined HTTP/1.x and WebSocket server.
//!
//! Every accepted socket starts as an HTTP session. Requests go to the
//! registered request handler (static files from the document root by
//! default); an upgrade request moves the socket into a WebSocket
//! connection whose messages go to the message handler. Each connection
//! writes through a small bounded queue and stops reading while it is full.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;
pub mod websocket;

pub use crate::config::ServerConfig;
pub use crate::http::{Request, Response};
pub use crate::lifecycle::Shutdown;
pub use crate::server::{Server, ServerError};
pub use crate::websocket::{ConnectionHandle, ConnectionState, SendError};
