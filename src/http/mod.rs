//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → session.rs (read loop, backpressure, upgrade handoff)
//!     → request.rs (frame and parse one request)
//!     → request handler, or files.rs (static files)
//!     → response.rs (encode head, stream body)
//!     → Send to client
//! ```

pub mod files;
pub mod request;
pub mod response;
pub mod session;

pub use request::{Request, RequestError};
pub use response::{Response, ResponseKind};
pub use session::HttpSession;
