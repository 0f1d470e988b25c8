//! Response values and their wire encoding.
//!
//! # Responsibilities
//! - `Response`: what a request handler returns (text or file)
//! - `EncodedResponse`: serialized head plus a body ready for the socket
//! - Standard error responses (400, 404, 500, ...)
//! - Write one encoded response to a socket
//!
//! # Design Decisions
//! - Handlers never see wire details; status line, `Server`,
//!   `Content-Length` and `Connection` headers are added here
//! - File bodies are streamed from an open handle, never buffered whole

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, SERVER};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::request::Request;

/// Content type used when a handler does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// What a request handler produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub kind: ResponseKind,
    /// Status for `String` responses. File responses derive theirs from
    /// the outcome of opening the file.
    pub status: StatusCode,
    /// Close the connection once this response is written.
    pub close: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// Inline body with a declared content type.
    String { text: String, content_type: String },
    /// A file to stream; content type comes from the extension.
    File { path: PathBuf },
}

impl Response {
    pub fn text(text: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::String {
                text: text.into(),
                content_type: content_type.into(),
            },
            status: StatusCode::OK,
            close: false,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self::text(text, DEFAULT_CONTENT_TYPE)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ResponseKind::File { path: path.into() },
            status: StatusCode::OK,
            close: false,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Ask for the connection to be closed after this response.
    pub fn with_close(mut self) -> Self {
        self.close = true;
        self
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::file(PathBuf::new())
    }
}

/// Body of an encoded response.
#[derive(Debug)]
pub enum EncodedBody {
    Empty,
    Bytes(Bytes),
    File { file: File, len: u64 },
}

/// A response serialized for the wire: head bytes plus body.
#[derive(Debug)]
pub struct EncodedResponse {
    pub status: StatusCode,
    pub head: Bytes,
    pub body: EncodedBody,
}

impl EncodedResponse {
    /// Bytes that follow the head on the wire.
    pub fn body_len(&self) -> u64 {
        match &self.body {
            EncodedBody::Empty => 0,
            EncodedBody::Bytes(b) => b.len() as u64,
            EncodedBody::File { len, .. } => *len,
        }
    }
}

/// Per-request facts every encoded response needs.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub version: Version,
    pub keep_alive: bool,
    pub head_only: bool,
    pub server_name: HeaderValue,
}

impl ResponseContext {
    pub fn for_request(request: &Request, keep_alive: bool, server_name: &str) -> Self {
        Self {
            version: request.version(),
            keep_alive,
            head_only: request.method() == Method::HEAD,
            server_name: server_value(server_name),
        }
    }

    /// Context for error responses sent before a request could be parsed.
    pub fn for_protocol_error(server_name: &str) -> Self {
        Self {
            version: Version::HTTP_11,
            keep_alive: false,
            head_only: false,
            server_name: server_value(server_name),
        }
    }

    pub fn text(&self, status: StatusCode, text: impl Into<Bytes>, content_type: &str) -> EncodedResponse {
        let body: Bytes = text.into();
        let head = self.encode_head(status, Some(content_type), body.len() as u64);
        let body = if self.head_only || body.is_empty() {
            EncodedBody::Empty
        } else {
            EncodedBody::Bytes(body)
        };
        EncodedResponse { status, head, body }
    }

    pub fn file(&self, file: File, len: u64, content_type: &str) -> EncodedResponse {
        let head = self.encode_head(StatusCode::OK, Some(content_type), len);
        let body = if self.head_only {
            EncodedBody::Empty
        } else {
            EncodedBody::File { file, len }
        };
        EncodedResponse {
            status: StatusCode::OK,
            head,
            body,
        }
    }

    pub fn bad_request(&self, why: &str) -> EncodedResponse {
        self.text(StatusCode::BAD_REQUEST, why.to_owned(), DEFAULT_CONTENT_TYPE)
    }

    pub fn not_found(&self, target: &str) -> EncodedResponse {
        self.text(
            StatusCode::NOT_FOUND,
            format!("The resource '{target}' was not found."),
            DEFAULT_CONTENT_TYPE,
        )
    }

    pub fn server_error(&self, what: &str) -> EncodedResponse {
        self.text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("An error occurred: '{what}'"),
            DEFAULT_CONTENT_TYPE,
        )
    }

    /// Bare status response whose body is the canonical reason phrase.
    pub fn status(&self, status: StatusCode) -> EncodedResponse {
        let reason = status.canonical_reason().unwrap_or("Error");
        self.text(status, reason.to_owned(), "text/plain")
    }

    fn encode_head(&self, status: StatusCode, content_type: Option<&str>, len: u64) -> Bytes {
        let mut headers = HeaderMap::new();
        headers.insert(SERVER, self.server_name.clone());
        if let Some(ct) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
            headers.insert(CONTENT_TYPE, ct);
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        // HTTP/1.0 closes unless told otherwise, HTTP/1.1 the reverse
        let http10 = self.version == Version::HTTP_10;
        if http10 && self.keep_alive {
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        } else if !http10 && !self.keep_alive {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }
        encode_head(self.version, status, &headers)
    }
}

fn server_value(name: &str) -> HeaderValue {
    HeaderValue::from_str(name).unwrap_or_else(|_| HeaderValue::from_static("http-ws-server"))
}

/// Serialize a status line and headers, terminated by the blank line.
pub fn encode_head(version: Version, status: StatusCode, headers: &HeaderMap) -> Bytes {
    let version = if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    };
    let mut out = Vec::with_capacity(128 + headers.len() * 32);
    out.extend_from_slice(
        format!(
            "{version} {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    Bytes::from(out)
}

/// Write one encoded response, streaming file bodies.
pub async fn write_response<W>(io: &mut W, response: EncodedResponse) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    io.write_all(&response.head).await?;
    match response.body {
        EncodedBody::Empty => {}
        EncodedBody::Bytes(bytes) => io.write_all(&bytes).await?,
        EncodedBody::File { file, len } => {
            let copied = tokio::io::copy(&mut file.take(len), io).await?;
            if copied != len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file shrank while sending ({copied} of {len} bytes)"),
                ));
            }
        }
    }
    io.flush().await
}

/// Extension-based MIME type, as served for file responses.
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "htm" | "html" | "php" => "text/html",
        "css" => "text/css",
        "txt" => "text/plain",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "swf" => "application/x-shockwave-flash",
        "flv" => "video/x-flv",
        "png" => "image/png",
        "jpe" | "jpeg" | "jpg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "ico" => "image/vnd.microsoft.icon",
        "tiff" | "tif" => "image/tiff",
        "svg" | "svgz" => "image/svg+xml",
        _ => "application/text",
    }
}
