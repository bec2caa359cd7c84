//! Single-attempt upstream fetch.
//!
//! # Responsibilities
//! - Validate the target URL before any I/O
//! - Issue exactly one outbound request (retries live in `resilience`)
//! - Buffer the whole response body so it can be rewritten
//!
//! # Design Decisions
//! - `reqwest` is built without decompression; together with the stripped
//!   `Accept-Encoding` header the origin answers with an identity body
//! - Redirect following is a per-fetcher choice: the mirror follows them,
//!   the external route hands them back to the caller

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use reqwest::redirect::Policy;
use thiserror::Error;
use url::Url;

use crate::config::TimeoutConfig;

/// Outbound request derived from an inbound one.
#[derive(Debug, Clone)]
pub struct MirroredRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    /// Shared buffer; cloning it per attempt does not copy the bytes.
    pub body: Bytes,
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Why a single fetch attempt failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("body read error: {0}")]
    Body(String),
}

impl FetchError {
    /// Only transport failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

/// One outbound HTTP call.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &MirroredRequest) -> Result<UpstreamResponse, FetchError>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher. `follow_redirects` decides whether 3xx responses are
    /// resolved here or returned to the caller.
    pub fn new(timeouts: &TimeoutConfig, follow_redirects: bool) -> Result<Self, reqwest::Error> {
        let policy = if follow_redirects {
            Policy::limited(10)
        } else {
            Policy::none()
        };

        let client = reqwest::Client::builder()
            .redirect(policy)
            .timeout(Duration::from_secs(timeouts.upstream_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &MirroredRequest) -> Result<UpstreamResponse, FetchError> {
        let url = Url::parse(&request.url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!("unsupported scheme {}", url.scheme())));
        }

        let response = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        tracing::debug!(
            url = %request.url,
            status = %status,
            bytes = body.len(),
            "Upstream responded"
        );

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
