//! State shared by the listener and all connection tasks.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::server::callbacks::Callbacks;
use crate::websocket::ConnectionRegistry;

#[derive(Debug)]
pub struct ServerContext {
    pub config: ServerConfig,
    pub callbacks: Callbacks,
    pub registry: Arc<ConnectionRegistry>,
    pub shutdown: Shutdown,
    pub tracker: ConnectionTracker,
}

impl ServerContext {
    pub fn new(
        config: ServerConfig,
        callbacks: Callbacks,
        registry: Arc<ConnectionRegistry>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            callbacks,
            registry,
            shutdown,
            tracker: ConnectionTracker::new(),
        }
    }
}
