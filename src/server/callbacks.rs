//! Application callbacks shared with every session and connection.

use std::sync::Arc;

use crate::http::request::Request;
use crate::http::response::Response;
use crate::websocket::{ConnectionHandle, ConnectionState};

/// Produces the response for one HTTP request. Called concurrently from
/// different connections.
pub type RequestHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Called for every inbound WebSocket message. Replies go through
/// [`ConnectionHandle::send`].
pub type MessageHandler = Arc<dyn Fn(ConnectionHandle, String) + Send + Sync>;

/// Called with `Connected` once per connection and at most once with
/// `Disconnected` afterwards.
pub type StateHandler = Arc<dyn Fn(ConnectionHandle, ConnectionState) + Send + Sync>;

/// The three callback slots. Read-only once the server runs.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub request: Option<RequestHandler>,
    pub message: Option<MessageHandler>,
    pub connection: Option<StateHandler>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("request", &self.request.is_some())
            .field("message", &self.message.is_some())
            .field("connection", &self.connection.is_some())
            .finish()
    }
}
