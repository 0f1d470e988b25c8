//! Server side of the WebSocket opening handshake.
//!
//! The upgrade request has already been read by the HTTP session, so the
//! handshake here only validates it, writes the `101` and wraps the socket,
//! keeping any bytes the client sent after its request.

use std::io;

use bytes::BytesMut;
use http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, SERVER, UPGRADE};
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{self, Role};
use tokio_tungstenite::WebSocketStream;

use crate::config::WebSocketConfig;
use crate::http::request::Request;
use crate::http::response::encode_head;

const SUPPORTED_VERSION: &str = "13";

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("unsupported WebSocket version: {0}")]
    UnsupportedVersion(String),

    #[error("I/O error during handshake: {0}")]
    Io(#[from] io::Error),
}

/// Check the upgrade request and compute the `Sec-WebSocket-Accept` value.
pub fn accept_key(request: &Request) -> Result<String, HandshakeError> {
    let headers = request.headers();
    let version = headers
        .get(SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if version.trim() != SUPPORTED_VERSION {
        return Err(HandshakeError::UnsupportedVersion(version.to_owned()));
    }

    let key = headers
        .get(SEC_WEBSOCKET_KEY)
        .map(|k| k.as_bytes())
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;
    Ok(derive_accept_key(key))
}

/// Answer the upgrade request on `stream` and hand back the WebSocket.
///
/// On a bad request a `400` is written before the error is returned.
pub async fn accept(
    mut stream: TcpStream,
    request: &Request,
    buffered: BytesMut,
    server_name: &str,
    config: &WebSocketConfig,
) -> Result<WebSocketStream<TcpStream>, HandshakeError> {
    let server = HeaderValue::from_str(server_name).unwrap_or_else(|_| HeaderValue::from_static("http-ws-server"));

    let accept = match accept_key(request) {
        Ok(accept) => accept,
        Err(e) => {
            let mut headers = HeaderMap::new();
            headers.insert(SERVER, server);
            headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static(SUPPORTED_VERSION));
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
            headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(0u64));
            let head = encode_head(Version::HTTP_11, StatusCode::BAD_REQUEST, &headers);
            stream.write_all(&head).await?;
            stream.shutdown().await?;
            return Err(e);
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(SERVER, server);
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(
        SEC_WEBSOCKET_ACCEPT,
        HeaderValue::from_str(&accept).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
    );
    let head = encode_head(Version::HTTP_11, StatusCode::SWITCHING_PROTOCOLS, &headers);
    stream.write_all(&head).await?;
    stream.flush().await?;

    let ws = WebSocketStream::from_partially_read(
        stream,
        buffered.to_vec(),
        Role::Server,
        Some(protocol_config(config)),
    )
    .await;
    Ok(ws)
}

fn protocol_config(config: &WebSocketConfig) -> protocol::WebSocketConfig {
    let mut ws_config = protocol::WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_bytes);
    ws_config.max_frame_size = Some(config.max_message_bytes);
    ws_config
}
