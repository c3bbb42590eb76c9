//! End-to-end tests: the full router against a mock upstream backend.
//!
//! The mock is a raw TCP listener that captures one request verbatim
//! and answers with a canned HTTP/1.1 response, so tests can assert on
//! both sides of the gateway: what was sent upstream (signed headers,
//! bucket-prefixed path, passed-through conditionals) and what was
//! relayed back.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tower::ServiceExt;

use awsv4_gateway::config::Settings;
use awsv4_gateway::server::app;
use awsv4_gateway::{upstream, AppState};

/// Spawn a one-shot mock upstream. Returns its address and a channel
/// that yields the raw request bytes it received.
async fn mock_upstream(response: &'static str) -> (SocketAddr, oneshot::Receiver<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut captured = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            captured.extend_from_slice(&chunk[..n]);
            if request_complete(&captured) {
                break;
            }
        }
        let _ = tx.send(String::from_utf8_lossy(&captured).into_owned());
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
    });

    (addr, rx)
}

/// True once the header block and any Content-Length body are fully read.
fn request_complete(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    buf.len() >= header_end + 4 + content_length
}

fn gateway_state(upstream_addr: SocketAddr, admin: bool) -> Arc<AppState> {
    let settings = Settings {
        access_key: "AKID".to_string(),
        secret_key: "secret".to_string(),
        endpoint: upstream_addr.to_string(),
        scheme: "http".to_string(),
        admin,
        connect_timeout: 2,
        request_timeout: 4,
        ..Settings::default()
    };
    let client = upstream::build_client(&settings).unwrap();
    Arc::new(AppState {
        settings,
        upstream: client,
    })
}

async fn read_body(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn get_relays_success_response() {
    let (addr, captured) = mock_upstream(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: image/jpeg\r\n\
         Etag: \"abc\"\r\n\
         Last-Modified: Wed, 21 Oct 2015 07:28:00 GMT\r\n\
         Content-Length: 8\r\n\
         Connection: close\r\n\r\n\
         JPEGDATA",
    )
    .await;

    let response = app(gateway_state(addr, false))
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/img/foo.jpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
    assert_eq!(response.headers().get("etag").unwrap(), "\"abc\"");
    assert_eq!(
        response.headers().get("last-modified").unwrap(),
        "Wed, 21 Oct 2015 07:28:00 GMT"
    );
    assert_eq!(read_body(response).await, b"JPEGDATA");

    // The upstream saw a signed, bucket-prefixed request.
    let sent = captured.await.unwrap();
    assert!(sent.starts_with("GET /test/img/foo.jpg HTTP/1.1\r\n"), "{sent}");
    assert!(sent.contains("authorization: AWS4-HMAC-SHA256 Credential=AKID/"));
    assert!(sent.contains(",Signature="));
    assert!(sent.contains("x-amz-date: "));
    assert!(sent.contains(
        "x-amz-content-sha256: e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    ));
}

#[tokio::test]
async fn upstream_error_drops_headers_and_body() {
    let (addr, _captured) = mock_upstream(
        "HTTP/1.1 404 Not Found\r\n\
         Content-Type: application/xml\r\n\
         Content-Length: 5\r\n\
         Connection: close\r\n\r\n\
         oops!",
    )
    .await;

    let response = app(gateway_state(addr, false))
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/img/missing.jpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get("content-type").is_none());
    assert!(read_body(response).await.is_empty());
}

#[tokio::test]
async fn conditional_headers_pass_through() {
    let (addr, captured) = mock_upstream(
        "HTTP/1.1 304 Not Modified\r\n\
         Etag: \"abc\"\r\n\
         Connection: close\r\n\r\n",
    )
    .await;

    let response = app(gateway_state(addr, false))
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/img/foo.jpg")
                .header("if-none-match", "\"abc\"")
                .header("if-modified-since", "Wed, 21 Oct 2015 07:28:00 GMT")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Non-2xx: the status is mirrored but upstream headers are dropped.
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(response.headers().get("etag").is_none());

    let sent = captured.await.unwrap();
    assert!(sent.contains("if-none-match: \"abc\""));
    assert!(sent.contains("if-modified-since: Wed, 21 Oct 2015 07:28:00 GMT"));
}

#[tokio::test]
async fn put_forwards_body_with_guessed_content_type() {
    let (addr, captured) = mock_upstream(
        "HTTP/1.1 200 OK\r\n\
         Etag: \"d41d\"\r\n\
         Content-Length: 0\r\n\
         Connection: close\r\n\r\n",
    )
    .await;

    let response = app(gateway_state(addr, true))
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/img/new.png")
                .body(Body::from("PNGDATA"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("etag").unwrap(), "\"d41d\"");

    let sent = captured.await.unwrap();
    assert!(sent.starts_with("PUT /test/img/new.png HTTP/1.1\r\n"), "{sent}");
    assert!(sent.contains("content-type: image/png"));
    assert!(sent.ends_with("PNGDATA"), "{sent}");
}

#[tokio::test]
async fn empty_auth_only_header_forwards_and_is_not_sent_upstream() {
    let (addr, captured) = mock_upstream(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: image/jpeg\r\n\
         Content-Length: 8\r\n\
         Connection: close\r\n\r\n\
         JPEGDATA",
    )
    .await;

    let response = app(gateway_state(addr, false))
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/img/foo.jpg")
                .header("x-auth-only", "")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // An empty value is not truthy: the real fetch happened.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, b"JPEGDATA");

    // The control header stays with the gateway.
    let sent = captured.await.unwrap().to_lowercase();
    assert!(!sent.contains("x-auth-only"), "{sent}");
}

#[tokio::test]
async fn success_without_content_type_defaults_to_octet_stream() {
    let (addr, _captured) = mock_upstream(
        "HTTP/1.1 200 OK\r\n\
         Content-Length: 4\r\n\
         Connection: close\r\n\r\n\
         blob",
    )
    .await;

    let response = app(gateway_state(addr, false))
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/blob/raw")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    assert_eq!(read_body(response).await, b"blob");
}
