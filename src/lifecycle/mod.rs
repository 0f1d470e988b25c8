//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → listener stops accepting
//!             → sessions/connections cancel in-flight I/O silently
//!             → Server::run waits for tracked connections to drain
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - One watch channel; every task selects on it next to its I/O
//! - Shutdown-induced cancellation is never logged as an error

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
