//! WebSocket connections.
//!
//! # Data Flow
//! ```text
//! HttpSession (upgrade request + socket)
//!     → handshake.rs (validate, 101, wrap socket)
//!     → connection.rs (read loop, outbound writes, Connected/Disconnected)
//!     ↔ registry.rs (live outboxes by id)
//!     ↔ handle.rs (what callbacks hold: id + registry)
//! ```
//!
//! # Design Decisions
//! - Callbacks never own a connection; a handle resolves through the
//!   registry and reports `Closed` after teardown
//! - Each connection keeps one write in flight and a bounded outbox

mod connection;
pub mod handle;
pub mod handshake;
pub mod registry;

pub(crate) use connection::WebSocketConnection;
pub use handle::{ConnectionHandle, ConnectionState, SendError, WsOutbound};
pub use handshake::HandshakeError;
pub use registry::ConnectionRegistry;
