//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (ids, live socket tracking)
//!     → Hand off to HTTP layer
//!
//! Per connection outbound path:
//!     write_queue.rs (bounded FIFO) → in_flight.rs (one write at a time)
//! ```
//!
//! # Design Decisions
//! - Bounded accept via semaphore prevents resource exhaustion
//! - Each socket tracked for graceful shutdown
//! - A full write queue pauses reads instead of buffering more

pub mod connection;
pub mod in_flight;
pub mod listener;
pub mod write_queue;
