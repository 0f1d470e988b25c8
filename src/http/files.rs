//! Static file responses.
//!
//! # Responsibilities
//! - Default request handler: map the request target onto the document root
//! - Turn a `Response::file` into 200 / 404 / 500 with an open file body
//!
//! # Design Decisions
//! - Only GET and HEAD are served by the default handler
//! - Targets must be absolute and free of `..`; a trailing `/` serves
//!   `index.html`
//! - Directories are reported as not found

use std::io;
use std::path::Path;

use http::{Method, StatusCode};
use tokio::fs::File;

use crate::http::request::Request;
use crate::http::response::{mime_type, EncodedResponse, Response, ResponseContext};

/// What the server answers when no request handler is registered.
pub fn default_response(document_root: &Path, request: &Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return Response::html("Unknown HTTP-method").with_status(StatusCode::BAD_REQUEST);
    }

    let target = request.uri().path();
    if !target.starts_with('/') || target.contains("..") {
        return Response::html("Illegal request-target").with_status(StatusCode::BAD_REQUEST);
    }

    let mut path = document_root.join(target.trim_start_matches('/'));
    if target.ends_with('/') {
        path.push("index.html");
    }
    Response::file(path)
}

/// Open `path` and build the response for it.
///
/// `target` is the request target echoed in the 404 body.
pub async fn open_file(ctx: &ResponseContext, target: &str, path: &Path) -> EncodedResponse {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return ctx.not_found(target),
        Err(e) => return ctx.server_error(&e.to_string()),
    };

    match file.metadata().await {
        Ok(meta) if meta.is_file() => ctx.file(file, meta.len(), mime_type(path)),
        Ok(_) => ctx.not_found(target),
        Err(e) => ctx.server_error(&e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::{EncodedBody, ResponseKind};
    use http::{HeaderValue, Version};
    use std::path::PathBuf;

    fn get(target: &str) -> Request {
        http::Request::builder()
            .uri(target)
            .body(bytes::Bytes::new())
            .unwrap()
    }

    fn ctx() -> ResponseContext {
        ResponseContext {
            version: Version::HTTP_11,
            keep_alive: true,
            head_only: false,
            server_name: HeaderValue::from_static("test"),
        }
    }

    #[test]
    fn maps_target_under_document_root() {
        let response = default_response(Path::new("www"), &get("/css/site.css"));
        assert_eq!(
            response.kind,
            ResponseKind::File {
                path: PathBuf::from("www/css/site.css")
            }
        );
    }

    #[test]
    fn trailing_slash_serves_index() {
        let response = default_response(Path::new("www"), &get("/docs/"));
        assert_eq!(
            response.kind,
            ResponseKind::File {
                path: PathBuf::from("www/docs/index.html")
            }
        );
    }

    #[test]
    fn rejects_parent_traversal_and_other_methods() {
        let response = default_response(Path::new("www"), &get("/../etc/passwd"));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.kind, Response::html("Illegal request-target").kind);

        let post = http::Request::builder()
            .method(Method::POST)
            .uri("/index.html")
            .body(bytes::Bytes::new())
            .unwrap();
        let response = default_response(Path::new("www"), &post);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.kind, Response::html("Unknown HTTP-method").kind);
    }

    #[tokio::test]
    async fn missing_file_is_404_naming_target() {
        let dir = tempfile::tempdir().unwrap();
        let response = open_file(&ctx(), "/missing.html", &dir.path().join("missing.html")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        match response.body {
            EncodedBody::Bytes(b) => {
                assert_eq!(&b[..], b"The resource '/missing.html' was not found.")
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn existing_file_reports_its_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<html>hello</html>").unwrap();

        let response = open_file(&ctx(), "/index.html", &path).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body_len(), 18);
        let head = String::from_utf8(response.head.to_vec()).unwrap();
        assert!(head.contains("content-type: text/html\r\n"));
        assert!(head.contains("content-length: 18\r\n"));
    }

    #[tokio::test]
    async fn directory_is_not_served() {
        let dir = tempfile::tempdir().unwrap();
        let response = open_file(&ctx(), "/", dir.path()).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}
