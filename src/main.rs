//! http-ws-server demo binary.
//!
//! Serves static files from a web root and echoes every WebSocket text
//! message back to its sender.
//!
//! ```text
//! http-ws-server --root ./www --port 8080 --threads 4
//! http-ws-server --config server.toml
//! ```

use std::path::PathBuf;

use clap::Parser;

use http_ws_server::config::{load_config, ServerConfig};
use http_ws_server::observability::logging::init_logging;
use http_ws_server::{ConnectionState, Server};

#[derive(Parser)]
#[command(name = "http-ws-server")]
#[command(about = "HTTP and WebSocket server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the config file
    #[arg(short, long)]
    address: Option<String>,

    /// Bind port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Worker threads (0 = hardware concurrency)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Document root for static files
    #[arg(short, long)]
    root: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(address) = cli.address {
        config.listener.address = address;
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(threads) = cli.threads {
        config.listener.threads = threads;
    }
    if let Some(root) = cli.root {
        config.http.document_root = root;
    }

    init_logging(&config.observability);

    tracing::info!(
        address = %config.listener.address,
        port = config.listener.port,
        document_root = %config.http.document_root.display(),
        "Configuration loaded"
    );

    let mut server = Server::new(config);
    server
        .on_connection(|conn, state| match state {
            ConnectionState::Connected => tracing::info!(connection_id = %conn.id(), "Client connected"),
            ConnectionState::Disconnected => tracing::info!(connection_id = %conn.id(), "Client disconnected"),
        })
        .on_message(|conn, message| {
            if let Err(e) = conn.send(message) {
                tracing::warn!(connection_id = %conn.id(), error = %e, "Echo dropped");
            }
        });

    server.start()?;
    Ok(())
}
