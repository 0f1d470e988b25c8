//! Request reading and classification.
//!
//! # Responsibilities
//! - Read exactly one HTTP/1.x request (head + body) from a socket
//! - Enforce header size, header count and body size limits
//! - Classify requests: keep-alive, WebSocket upgrade
//!
//! # Design Decisions
//! - Head tokenizing is delegated to `httparse`; this module only frames
//! - Nothing is consumed from the read buffer until a whole request has
//!   arrived, which makes `read_request` cancel safe and lets pipelined
//!   bytes stay buffered for the next call (or for the WebSocket handoff)
//! - Limits are checked before the full request is buffered

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING, UPGRADE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::HttpConfig;

/// An HTTP request as handed to the request handler.
///
/// The body is raw bytes; handlers decode it as they see fit.
pub type Request = http::Request<Bytes>;

/// Why no request could be read.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The peer closed the connection between requests.
    #[error("connection closed by peer")]
    PeerClosed,

    /// The peer closed the connection in the middle of a request.
    #[error("connection closed mid-request")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request head exceeds limits")]
    HeaderTooLarge,

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("unsupported transfer coding")]
    UnsupportedTransferCoding,
}

impl RequestError {
    /// Status of the error response owed to the peer, if one is still
    /// possible.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Malformed(_) => Some(StatusCode::BAD_REQUEST),
            RequestError::HeaderTooLarge => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            RequestError::BodyTooLarge(_) => Some(StatusCode::PAYLOAD_TOO_LARGE),
            RequestError::UnsupportedTransferCoding => Some(StatusCode::NOT_IMPLEMENTED),
            RequestError::PeerClosed | RequestError::UnexpectedEof | RequestError::Io(_) => None,
        }
    }
}

/// Size limits applied while reading requests.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_header_bytes: usize,
    pub max_headers: usize,
    pub max_body_bytes: usize,
}

impl From<&HttpConfig> for RequestLimits {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_header_bytes: config.max_header_bytes,
            max_headers: config.max_headers,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

/// Reads requests one at a time from the read half of a connection.
#[derive(Debug)]
pub struct RequestReader<R> {
    io: R,
    buf: BytesMut,
    limits: RequestLimits,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    pub fn new(io: R, limits: RequestLimits) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(4096),
            limits,
        }
    }

    /// Read one full request.
    ///
    /// Cancel safe: partially received bytes stay buffered.
    pub async fn read_request(&mut self) -> Result<Request, RequestError> {
        loop {
            if let Some(request) = self.try_parse()? {
                return Ok(request);
            }

            let n = self.io.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(if self.buf.is_empty() {
                    RequestError::PeerClosed
                } else {
                    RequestError::UnexpectedEof
                });
            }
        }
    }

    /// Read and discard until the peer closes (or errors).
    pub async fn drain(&mut self) {
        self.buf.clear();
        loop {
            match self.io.read_buf(&mut self.buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => self.buf.clear(),
            }
        }
    }

    /// Give back the socket half and whatever was read past the last request.
    pub fn into_parts(self) -> (R, BytesMut) {
        (self.io, self.buf)
    }

    fn try_parse(&mut self) -> Result<Option<Request>, RequestError> {
        let Some(head) = parse_head(&self.buf, &self.limits)? else {
            return Ok(None);
        };

        let body_start = head.len;
        let (body, consumed) = match head.framing {
            BodyFraming::Empty => (Vec::new(), body_start),
            BodyFraming::Length(len) => {
                if len > self.limits.max_body_bytes {
                    return Err(RequestError::BodyTooLarge(self.limits.max_body_bytes));
                }
                if self.buf.len() < body_start + len {
                    return Ok(None);
                }
                (self.buf[body_start..body_start + len].to_vec(), body_start + len)
            }
            BodyFraming::Chunked => {
                match decode_chunked(&self.buf[body_start..], self.limits.max_body_bytes)? {
                    Some((body, used)) => (body, body_start + used),
                    None => return Ok(None),
                }
            }
        };

        self.buf.advance(consumed);

        let mut request = http::Request::new(Bytes::from(body));
        *request.method_mut() = head.method;
        *request.uri_mut() = head.uri;
        *request.version_mut() = head.version;
        *request.headers_mut() = head.headers;
        Ok(Some(request))
    }
}

#[derive(Debug)]
enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
}

#[derive(Debug)]
struct Head {
    len: usize,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    framing: BodyFraming,
}

fn parse_head(buf: &[u8], limits: &RequestLimits) -> Result<Option<Head>, RequestError> {
    let mut slots = vec![httparse::EMPTY_HEADER; limits.max_headers];
    let mut parsed = httparse::Request::new(&mut slots);

    let len = match parsed.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            if buf.len() > limits.max_header_bytes {
                return Err(RequestError::HeaderTooLarge);
            }
            return Ok(None);
        }
        Err(httparse::Error::TooManyHeaders) => return Err(RequestError::HeaderTooLarge),
        Err(e) => return Err(RequestError::Malformed(e.to_string())),
    };
    if len > limits.max_header_bytes {
        return Err(RequestError::HeaderTooLarge);
    }

    let method = parsed
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or_else(|| RequestError::Malformed("invalid method".into()))?;
    let uri = parsed
        .path
        .and_then(|p| p.parse::<Uri>().ok())
        .ok_or_else(|| RequestError::Malformed("invalid request-target".into()))?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(RequestError::Malformed("unsupported HTTP version".into())),
    };

    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| RequestError::Malformed(format!("invalid header name '{}'", header.name)))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| RequestError::Malformed(format!("invalid value for header '{name}'")))?;
        headers.append(name, value);
    }

    let framing = body_framing(&headers)?;

    Ok(Some(Head {
        len,
        method,
        uri,
        version,
        headers,
        framing,
    }))
}

fn body_framing(headers: &HeaderMap) -> Result<BodyFraming, RequestError> {
    if let Some(te) = headers.get(TRANSFER_ENCODING) {
        let te = te
            .to_str()
            .map_err(|_| RequestError::Malformed("invalid Transfer-Encoding".into()))?;
        // chunked must be the final coding; nothing else is decoded here
        return if te.trim().eq_ignore_ascii_case("chunked") {
            Ok(BodyFraming::Chunked)
        } else {
            Err(RequestError::UnsupportedTransferCoding)
        };
    }

    let mut lengths = headers.get_all(CONTENT_LENGTH).iter();
    let Some(first) = lengths.next() else {
        return Ok(BodyFraming::Empty);
    };
    if lengths.any(|other| other != first) {
        return Err(RequestError::Malformed("conflicting Content-Length".into()));
    }
    let len = first
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| RequestError::Malformed("invalid Content-Length".into()))?;

    Ok(if len == 0 {
        BodyFraming::Empty
    } else {
        BodyFraming::Length(len)
    })
}

/// Decode a chunked body from the start of `buf`.
///
/// Returns the body and the number of bytes it occupied, or `None` if more
/// input is needed.
fn decode_chunked(buf: &[u8], limit: usize) -> Result<Option<(Vec<u8>, usize)>, RequestError> {
    let mut pos = 0;
    let mut body = Vec::new();

    loop {
        let size = match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete((used, size))) => {
                pos += used;
                size
            }
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(_) => return Err(RequestError::Malformed("invalid chunk size".into())),
        };

        if size == 0 {
            // trailer section, terminated by an empty line
            loop {
                let Some(eol) = find_crlf(&buf[pos..]) else {
                    return Ok(None);
                };
                pos += eol + 2;
                if eol == 0 {
                    return Ok(Some((body, pos)));
                }
            }
        }

        let size = usize::try_from(size).map_err(|_| RequestError::BodyTooLarge(limit))?;
        if body.len().saturating_add(size) > limit {
            return Err(RequestError::BodyTooLarge(limit));
        }
        if buf.len() < pos + size + 2 {
            return Ok(None);
        }
        body.extend_from_slice(&buf[pos..pos + size]);
        if &buf[pos + size..pos + size + 2] != b"\r\n" {
            return Err(RequestError::Malformed("chunk not terminated by CRLF".into()));
        }
        pos += size + 2;
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Whether the connection may carry another request after this one.
pub fn keep_alive(request: &Request) -> bool {
    let headers = request.headers();
    match request.version() {
        Version::HTTP_10 => has_token(headers, CONNECTION, "keep-alive"),
        _ => !has_token(headers, CONNECTION, "close"),
    }
}

/// Whether the request asks to switch to the WebSocket protocol.
pub fn is_upgrade(request: &Request) -> bool {
    request.method() == Method::GET
        && request.version() >= Version::HTTP_11
        && has_token(request.headers(), CONNECTION, "upgrade")
        && has_token(request.headers(), UPGRADE, "websocket")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(input: &[u8]) -> RequestReader<&[u8]> {
        RequestReader::new(input, RequestLimits::default())
    }

    #[tokio::test]
    async fn reads_simple_get() {
        let mut r = reader(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let req = r.read_request().await.unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri().path(), "/index.html");
        assert_eq!(req.version(), Version::HTTP_11);
        assert_eq!(req.headers()["host"], "localhost");
        assert!(req.body().is_empty());

        assert!(matches!(r.read_request().await, Err(RequestError::PeerClosed)));
    }

    #[tokio::test]
    async fn reads_pipelined_requests_in_order() {
        let mut r = reader(
            b"POST /a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET /b HTTP/1.1\r\n\r\nGET /c HTTP/1.1\r\n\r\n",
        );
        let a = r.read_request().await.unwrap();
        assert_eq!(a.body(), "hello");
        assert_eq!(r.read_request().await.unwrap().uri().path(), "/b");
        assert_eq!(r.read_request().await.unwrap().uri().path(), "/c");
    }

    #[tokio::test]
    async fn decodes_chunked_body_with_trailer() {
        let mut r = reader(
            b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: 1\r\n\r\n",
        );
        let req = r.read_request().await.unwrap();
        assert_eq!(req.body(), "hello world");
        let (_, rest) = r.into_parts();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn binary_body_is_passed_through() {
        let mut r = reader(b"PUT /blob HTTP/1.1\r\nContent-Length: 4\r\n\r\n\xff\x00\xfe\x80");
        let req = r.read_request().await.unwrap();
        assert_eq!(&req.body()[..], b"\xff\x00\xfe\x80");
    }

    #[tokio::test]
    async fn truncated_request_is_unexpected_eof() {
        let mut r = reader(b"GET /index.html HTTP/1.1\r\nHost: loc");
        assert!(matches!(r.read_request().await, Err(RequestError::UnexpectedEof)));

        let mut r = reader(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        assert!(matches!(r.read_request().await, Err(RequestError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let mut r = reader(b"\x01\x02 nonsense\r\n\r\n");
        let err = r.read_request().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let limits = RequestLimits {
            max_header_bytes: 64,
            ..RequestLimits::default()
        };
        let input = format!("GET / HTTP/1.1\r\nX-Big: {}\r\n\r\n", "a".repeat(200));
        let mut r = RequestReader::new(input.as_bytes(), limits);
        let err = r.read_request().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_buffering() {
        let limits = RequestLimits {
            max_body_bytes: 4,
            ..RequestLimits::default()
        };
        let mut r = RequestReader::new(&b"POST / HTTP/1.1\r\nContent-Length: 1000\r\n\r\n"[..], limits);
        let err = r.read_request().await.unwrap_err();
        assert!(matches!(err, RequestError::BodyTooLarge(4)));
        assert_eq!(err.status(), Some(StatusCode::PAYLOAD_TOO_LARGE));
    }

    #[tokio::test]
    async fn gzip_transfer_coding_unsupported() {
        let mut r = reader(b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n");
        let err = r.read_request().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_IMPLEMENTED));
    }

    #[tokio::test]
    async fn leftover_bytes_survive_into_parts() {
        let mut r = reader(b"GET /ws HTTP/1.1\r\n\r\n\x81\x05hello");
        r.read_request().await.unwrap();
        let (_, rest) = r.into_parts();
        assert_eq!(&rest[..], b"\x81\x05hello");
    }

    fn request(version: Version, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().uri("/").version(version);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn keep_alive_rules() {
        assert!(keep_alive(&request(Version::HTTP_11, &[])));
        assert!(!keep_alive(&request(Version::HTTP_11, &[("Connection", "Close")])));
        assert!(!keep_alive(&request(Version::HTTP_10, &[])));
        assert!(keep_alive(&request(Version::HTTP_10, &[("Connection", "keep-alive")])));
    }

    #[test]
    fn upgrade_detection() {
        let upgrade = request(
            Version::HTTP_11,
            &[("Connection", "keep-alive, Upgrade"), ("Upgrade", "WebSocket")],
        );
        assert!(is_upgrade(&upgrade));

        let plain = request(Version::HTTP_11, &[("Upgrade", "websocket")]);
        assert!(!is_upgrade(&plain));

        let h2c = request(Version::HTTP_11, &[("Connection", "upgrade"), ("Upgrade", "h2c")]);
        assert!(!is_upgrade(&h2c));
    }
}
