//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener, sessions, connections produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Connection id flows through every event of a connection
//! - Metrics are cheap (no-op until a recorder is installed)
//! - Shutdown-induced cancellation produces no error events

pub mod logging;
pub mod metrics;
