//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the three mirror routes
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Bind server to listener
//! - Drain in-flight requests on shutdown

use std::sync::Arc;

use axum::{
    routing::{any, get},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::handlers::{check_alive, external_handler, mirror_handler};
use crate::http::request::UuidRequestId;
use crate::resilience::RetryPolicy;
use crate::rewrite::{ContentRewriter, SubstringRewriter};
use crate::upstream::{Fetcher, HttpFetcher};

/// Why the server could not be assembled.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to build body rewriter: {0}")]
    Rewriter(#[from] aho_corasick::BuildError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    /// Follows redirects; used with retry for the mirrored origin.
    pub mirror_fetcher: Arc<dyn Fetcher>,
    /// Returns redirects untouched so they can be re-targeted.
    pub external_fetcher: Arc<dyn Fetcher>,
    pub rewriter: Arc<dyn ContentRewriter>,
    pub retry: RetryPolicy,
}

/// HTTP server for the mirror.
pub struct HttpServer {
    router: Router,
    config: Arc<ProxyConfig>,
}

impl HttpServer {
    /// Create a new HTTP server with `reqwest` fetchers.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let mirror_fetcher = Arc::new(HttpFetcher::new(&config.timeouts, true)?);
        let external_fetcher = Arc::new(HttpFetcher::new(&config.timeouts, false)?);
        Self::with_fetchers(config, mirror_fetcher, external_fetcher)
    }

    /// Create a server around the given fetchers.
    pub fn with_fetchers(
        config: ProxyConfig,
        mirror_fetcher: Arc<dyn Fetcher>,
        external_fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ServerError> {
        let config = Arc::new(config);
        let state = AppState {
            rewriter: Arc::new(SubstringRewriter::new(&config.mirror)?),
            retry: RetryPolicy::from_config(&config.retries),
            config: config.clone(),
            mirror_fetcher,
            external_fetcher,
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The fixed routes take precedence over the fallback, so `/check` and
    /// `/_EXTERNAL_` are never mirrored. Non-GET requests to the liveness
    /// paths fall through to the mirror. The inbound deadline outlasts the
    /// whole retry loop, so a stalled origin ends in the loop's 500.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/_EXTERNAL_", any(external_handler))
            .route("/check", get(check_alive).fallback(mirror_handler))
            .route("/check_alive", get(check_alive).fallback(mirror_handler))
            .fallback(mirror_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
                    .layer(TimeoutLayer::new(config.request_deadline())),
            )
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.mirror.upstream_base(),
            secondary_domains = self.config.mirror.secondary_domains.len(),
            request_deadline_ms = self.config.request_deadline().as_millis() as u64,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{FetchError, MirroredRequest, UpstreamResponse};
    use async_trait::async_trait;
    use axum::body::{Body, Bytes};
    use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Records every request and answers with a fixed response.
    struct RecordingFetcher {
        response: UpstreamResponse,
        seen: Mutex<Vec<MirroredRequest>>,
    }

    impl RecordingFetcher {
        fn new(status: StatusCode, headers: HeaderMap, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                response: UpstreamResponse {
                    status,
                    headers,
                    body: Bytes::from_static(body.as_bytes()),
                },
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last(&self) -> MirroredRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn fetch(&self, request: &MirroredRequest) -> Result<UpstreamResponse, FetchError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    /// Gets headers but loses the body stream on every attempt.
    #[derive(Default)]
    struct TruncatingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for TruncatingFetcher {
        async fn fetch(&self, _request: &MirroredRequest) -> Result<UpstreamResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Body("connection closed before message completed".into()))
        }
    }

    fn mirror_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.mirror.target_domain = "https://origin.example".into();
        config.mirror.secondary_domains = vec!["https://cdn.example".into()];
        config
    }

    fn router_with(config: ProxyConfig, fetcher: Arc<RecordingFetcher>) -> Router {
        HttpServer::with_fetchers(config, fetcher.clone(), fetcher)
            .unwrap()
            .router()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_check_makes_no_upstream_call() {
        let fetcher = RecordingFetcher::new(StatusCode::OK, HeaderMap::new(), "");
        // No TARGET_DOMAIN at all.
        let router = router_with(ProxyConfig::default(), fetcher.clone());

        for path in ["/check", "/check_alive"] {
            let response = router
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().contains_key("x-request-id"));
            assert_eq!(body_string(response).await, "Ok");
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_post_to_check_is_mirrored() {
        let fetcher = RecordingFetcher::new(StatusCode::OK, HeaderMap::new(), "mirrored");
        let router = router_with(mirror_config(), fetcher.clone());

        let response = router
            .oneshot(Request::post("/check").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "mirrored");
        assert_eq!(fetcher.last().url, "https://origin.example/check");
    }

    #[tokio::test]
    async fn test_external_without_param_is_bad_request() {
        let fetcher = RecordingFetcher::new(StatusCode::OK, HeaderMap::new(), "");
        let router = router_with(mirror_config(), fetcher.clone());

        for uri in ["/_EXTERNAL_", "/_EXTERNAL_?EXTERNAL_URL=", "/_EXTERNAL_?other=1"] {
            let response = router
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_mirror_forwards_and_rewrites() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("999"));
        let fetcher = RecordingFetcher::new(
            StatusCode::OK,
            headers,
            r#"<a href="https://origin.example/about">a</a><script src="https://cdn.example/x.js"></script>"#,
        );
        let router = router_with(mirror_config(), fetcher.clone());

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/blog/post?id=7&EXTERNAL_URL=nope")
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(header::COOKIE, "session=abc")
            .body(Body::from("form=1"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/html");
        assert_ne!(
            response.headers().get(header::CONTENT_LENGTH).map(|v| v.as_bytes()),
            Some(&b"999"[..])
        );
        assert_eq!(
            body_string(response).await,
            r#"<a href="/about">a</a><script src="/_EXTERNAL_?EXTERNAL_URL=https://cdn.example/x.js"></script>"#
        );

        let seen = fetcher.last();
        assert_eq!(seen.method, Method::PUT);
        assert_eq!(seen.url, "https://origin.example/blog/post?id=7");
        assert_eq!(seen.body, Bytes::from_static(b"form=1"));
        assert!(seen.headers.get(header::ACCEPT_ENCODING).is_none());
        assert_eq!(seen.headers.get(header::COOKIE).unwrap(), "session=abc");
        assert!(seen.headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_target_endpoint_used_for_upstream() {
        let fetcher = RecordingFetcher::new(StatusCode::OK, HeaderMap::new(), "");
        let mut config = mirror_config();
        config.mirror.target_endpoint = Some("http://10.0.0.5:8080".into());
        let router = router_with(config, fetcher.clone());

        router
            .oneshot(Request::get("/a").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(fetcher.last().url, "http://10.0.0.5:8080/a");
    }

    #[tokio::test]
    async fn test_external_redirect_retargeted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LOCATION,
            HeaderValue::from_static("https://origin.example/x?y=1"),
        );
        let fetcher = RecordingFetcher::new(StatusCode::FOUND, headers, "moved");
        let router = router_with(mirror_config(), fetcher.clone());

        let request = Request::get("/_EXTERNAL_?EXTERNAL_URL=https%3A%2F%2Fcdn.example%2Fgo")
            .header(header::HOST, "mirror.local:3000")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "http://mirror.local:3000/x?y=1"
        );
        assert_eq!(body_string(response).await, "");
        assert_eq!(fetcher.last().url, "https://cdn.example/go");
    }

    #[tokio::test]
    async fn test_external_invalid_url_is_server_error() {
        let fetcher = RecordingFetcher::new(StatusCode::OK, HeaderMap::new(), "");
        let router = router_with(mirror_config(), fetcher.clone());

        let response = router
            .oneshot(Request::get("/_EXTERNAL_?url=not%20a%20url").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_body_failure_is_server_error() {
        let fetcher = Arc::new(TruncatingFetcher::default());
        let router = HttpServer::with_fetchers(mirror_config(), fetcher.clone(), fetcher.clone())
            .unwrap()
            .router();

        let response = router
            .clone()
            .oneshot(Request::get("/page").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1, "Body failures are not retried");

        let response = router
            .oneshot(
                Request::get("/_EXTERNAL_?EXTERNAL_URL=https%3A%2F%2Fcdn.example%2Fa.js")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let fetcher = RecordingFetcher::new(StatusCode::OK, HeaderMap::new(), "");
        let mut config = mirror_config();
        config.limits.max_body_size = 8;
        let router = router_with(config, fetcher.clone());

        // No Content-Length: only the streaming limit can catch it.
        let undeclared = Request::post("/upload")
            .body(Body::from("0123456789abcdef"))
            .unwrap();
        let response = router.clone().oneshot(undeclared).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let declared = Request::post("/upload")
            .header(header::CONTENT_LENGTH, "16")
            .body(Body::from("0123456789abcdef"))
            .unwrap();
        let response = router.clone().oneshot(declared).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let small = Request::post("/upload").body(Body::from("0123")).unwrap();
        let response = router.oneshot(small).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fetcher.last().body, Bytes::from_static(b"0123"));
    }
}
