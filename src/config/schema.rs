//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, worker threads).
    pub listener: ListenerConfig,

    /// HTTP session settings.
    pub http: HttpConfig,

    /// WebSocket connection settings.
    pub websocket: WebSocketConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// Configuration bound to `address:port` with `threads` workers,
    /// everything else defaulted.
    pub fn new(address: impl Into<String>, port: u16, threads: usize) -> Self {
        let mut config = Self::default();
        config.listener.address = address.into();
        config.listener.port = port;
        config.listener.threads = threads;
        config
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0").
    pub address: String,

    /// Bind port. `0` lets the OS pick one.
    pub port: u16,

    /// Worker thread count. `0` uses the available hardware concurrency.
    pub threads: usize,

    /// Maximum concurrent connections (backpressure on accept).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// Parse `address:port` into a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: std::net::IpAddr = self.address.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Worker count with `0` resolved to the hardware concurrency.
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
            threads: 0,
            max_connections: 10_000,
        }
    }
}

/// HTTP session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Directory the default file handler serves from.
    pub document_root: PathBuf,

    /// Value of the `Server` header on every response.
    pub server_name: String,

    /// Responses that may be queued per session before reads pause.
    pub queue_capacity: usize,

    /// Maximum size of a request head (request line + headers).
    pub max_header_bytes: usize,

    /// Maximum number of request headers.
    pub max_headers: usize,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// How long a half-closed socket keeps draining the peer, in milliseconds.
    pub linger_ms: u64,
}

impl HttpConfig {
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            document_root: PathBuf::from("www"),
            server_name: concat!("http-ws-server/", env!("CARGO_PKG_VERSION")).to_string(),
            queue_capacity: 8,
            max_header_bytes: 8 * 1024,
            max_headers: 64,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            linger_ms: 500,
        }
    }
}

/// WebSocket connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Outbound messages that may be queued per connection.
    pub queue_capacity: usize,

    /// Maximum size of one inbound message in bytes.
    pub max_message_bytes: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            max_message_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = ServerConfig::default();
        assert_eq!(config.http.queue_capacity, 8);
        assert_eq!(config.websocket.queue_capacity, 8);
        assert_eq!(
            config.listener.socket_addr().unwrap(),
            "0.0.0.0:8080".parse().unwrap()
        );
    }

    #[test]
    fn zero_threads_means_hardware_concurrency() {
        let config = ServerConfig::new("127.0.0.1", 0, 0);
        assert!(config.listener.worker_threads() >= 1);

        let config = ServerConfig::new("127.0.0.1", 0, 3);
        assert_eq!(config.listener.worker_threads(), 3);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [listener]
            port = 9999

            [http]
            document_root = "public"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 9999);
        assert_eq!(config.listener.address, "0.0.0.0");
        assert_eq!(config.http.document_root, PathBuf::from("public"));
        assert_eq!(config.http.max_headers, 64);
    }
}
