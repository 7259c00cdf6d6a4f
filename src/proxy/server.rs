// src/proxy/server.rs

use std::error::Error as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::engine::Orchestrator;
use crate::errors::{Result, WatchproxyError};
use crate::proxy::dial::{DialPolicy, send_with_retry};

/// Largest request body buffered for forwarding.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Hop-by-hop headers are never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
pub struct ProxyState {
    orchestrator: Arc<Orchestrator>,
    upstream: SocketAddr,
    client: reqwest::Client,
    policy: DialPolicy,
}

impl ProxyState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        upstream: SocketAddr,
        policy: DialPolicy,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WatchproxyError::Proxy(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            orchestrator,
            upstream,
            client,
            policy,
        })
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }
}

/// Every path and method goes to the same handler.
pub fn router(state: ProxyState) -> Router {
    Router::new().fallback(proxy_handler).with_state(state)
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| WatchproxyError::Proxy(format!("cannot listen on {addr}: {e}")))
}

/// Serve until the listener fails or the task is dropped.
pub async fn serve(listener: TcpListener, state: ProxyState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("proxy listening on {addr}, forwarding to {}", state.upstream);
    }
    axum::serve(listener, router(state))
        .await
        .map_err(|e| WatchproxyError::Proxy(format!("proxy server failed: {e}")))
}

/// Drain pending work, then forward. A request never reaches the
/// application while a rebuild is executing.
async fn proxy_handler(State(state): State<ProxyState>, req: Request) -> Response {
    let report = state.orchestrator.drain().await;
    if !report.is_empty() {
        debug!(
            runs = report.runs.len(),
            errors = report.errors.len(),
            "drained before forwarding"
        );
    }

    forward(&state, req).await
}

async fn forward(state: &ProxyState, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let url = upstream_url(state.upstream, &parts.uri);
    let headers = request_headers(&parts.headers);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "request body rejected");
            return body_rejection(&err);
        }
    };

    let method = parts.method;
    let result = send_with_retry(&state.policy, || {
        state
            .client
            .request(method.clone(), &url)
            .headers(headers.clone())
            .body(body.clone())
    })
    .await;

    let upstream = match result {
        Ok(resp) => resp,
        Err(err) => {
            let message = error_chain(&err);
            warn!(url = %url, error = %message, "application unreachable");
            return plain(StatusCode::BAD_GATEWAY, message);
        }
    };

    let status = upstream.status();
    let mut response_headers = HeaderMap::with_capacity(upstream.headers().len());
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name.as_str()) {
            response_headers.append(name.clone(), value.clone());
        }
    }

    let stream = upstream.bytes_stream().map_err(std::io::Error::other);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

fn upstream_url(upstream: SocketAddr, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("http://{upstream}{path_and_query}")
}

/// Copy forwardable request headers; the incoming `Host` moves to
/// `X-Forwarded-Host`.
fn request_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 1);
    for (name, value) in incoming {
        if name == axum::http::header::HOST || is_hop_by_hop(name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if let Some(host) = incoming.get(axum::http::header::HOST) {
        headers.insert("x-forwarded-host", host.clone());
    }
    headers
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// 413 when the body hit the size cap, 400 when reading it failed.
fn body_rejection(err: &axum::Error) -> Response {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return plain(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("request body exceeds {MAX_BODY_BYTES} bytes"),
            );
        }
        source = cause.source();
    }
    plain(StatusCode::BAD_REQUEST, format!("could not read request body: {err}"))
}

fn plain(status: StatusCode, message: String) -> Response {
    let mut response = (status, message).into_response();
    response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_moves_to_forwarded_host() {
        let mut incoming = HeaderMap::new();
        incoming.insert("host", HeaderValue::from_static("localhost:8080"));
        incoming.insert("connection", HeaderValue::from_static("keep-alive"));
        incoming.insert("accept", HeaderValue::from_static("text/html"));

        let out = request_headers(&incoming);
        assert!(out.get("host").is_none());
        assert!(out.get("connection").is_none());
        assert_eq!(out.get("x-forwarded-host").unwrap(), "localhost:8080");
        assert_eq!(out.get("accept").unwrap(), "text/html");
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let err = axum::body::to_bytes(Body::from(vec![0u8; 32]), 16)
            .await
            .unwrap_err();
        assert_eq!(body_rejection(&err).status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn broken_body_is_400() {
        let chunks = futures::stream::iter([
            Ok(axum::body::Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let err = axum::body::to_bytes(Body::from_stream(chunks), MAX_BODY_BYTES)
            .await
            .unwrap_err();
        assert_eq!(body_rejection(&err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_url_keeps_path_and_query() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let uri: Uri = "/api/items?page=2".parse().unwrap();
        assert_eq!(
            upstream_url(addr, &uri),
            "http://127.0.0.1:8081/api/items?page=2"
        );
        assert_eq!(upstream_url(addr, &Uri::from_static("http://x")), "http://127.0.0.1:8081/");
    }
}
