//! Route handlers.
//!
//! - `mirror_handler`: catch-all, fetch from the mirrored origin with retry
//!   and rewrite the body
//! - `external_handler`: fetch an explicit URL once; redirects are
//!   re-targeted at the mirror, everything else is rewritten
//! - `check_alive`: liveness, no upstream call

use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, request::Parts, Request};
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use url::Url;

use crate::error::MirrorError;
use crate::http::request::{external_target, forwarded_headers, mirror_url, request_id};
use crate::http::response::{redirect_response, rewritten_response};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::retries::fatal_error;
use crate::rewrite::{is_redirect, retarget_location, InboundOrigin};
use crate::upstream::{MirroredRequest, UpstreamResponse};

/// Liveness probe.
pub async fn check_alive() -> &'static str {
    "Ok"
}

/// Mirror the request against the configured origin.
pub async fn mirror_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = mirror(&state, request)
        .await
        .unwrap_or_else(IntoResponse::into_response);

    metrics::record_request("mirror", method.as_str(), response.status().as_u16(), start);
    response
}

/// Proxy the URL named by the `EXTERNAL_URL` (or legacy `url`) parameter.
pub async fn external_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = external(&state, request)
        .await
        .unwrap_or_else(IntoResponse::into_response);

    metrics::record_request("external", method.as_str(), response.status().as_u16(), start);
    response
}

async fn mirror(state: &AppState, request: Request<Body>) -> Result<Response, MirrorError> {
    let (parts, body) = request.into_parts();
    let url = mirror_url(
        state.config.mirror.upstream_base(),
        parts.uri.path(),
        parts.uri.query(),
    );

    tracing::debug!(
        request_id = %request_id(&parts.headers),
        method = %parts.method,
        url = %url,
        "Mirroring request"
    );

    let mirrored = mirrored_request(state, &parts, url, body).await?;
    let upstream = state
        .retry
        .execute(state.mirror_fetcher.as_ref(), &mirrored)
        .await?;

    Ok(rewrite(state, &upstream))
}

async fn external(state: &AppState, request: Request<Body>) -> Result<Response, MirrorError> {
    let (parts, body) = request.into_parts();
    let target = external_target(parts.uri.query()).ok_or(MirrorError::MissingExternalUrl)?;
    let fetched = Url::parse(&target).map_err(|e| MirrorError::InvalidUrl {
        url: target.clone(),
        reason: e.to_string(),
    })?;

    tracing::debug!(
        request_id = %request_id(&parts.headers),
        method = %parts.method,
        url = %target,
        "Proxying external request"
    );

    let mirrored = mirrored_request(state, &parts, target, body).await?;
    let upstream = state
        .external_fetcher
        .fetch(&mirrored)
        .await
        .map_err(|e| fatal_error(&mirrored.url, e))?;

    if is_redirect(upstream.status) {
        if let Some(location) = upstream
            .headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            let mut origin = InboundOrigin::from_headers(&parts.headers);
            if origin.host.is_none() {
                origin.host = parts.uri.authority().map(|a| a.to_string());
            }
            if let Some(retargeted) = retarget_location(location, &fetched, &origin) {
                tracing::debug!(
                    status = %upstream.status,
                    from = %location,
                    to = %retargeted,
                    "Re-targeting redirect"
                );
                return Ok(redirect_response(upstream.status, &retargeted));
            }
        }
    }

    Ok(rewrite(state, &upstream))
}

async fn mirrored_request(
    state: &AppState,
    parts: &Parts,
    url: String,
    body: Body,
) -> Result<MirroredRequest, MirrorError> {
    Ok(MirroredRequest {
        method: parts.method.clone(),
        url,
        headers: forwarded_headers(&parts.headers),
        body: read_body(body, state.config.limits.max_body_size).await?,
    })
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, MirrorError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        if exceeds_limit(&e) {
            MirrorError::PayloadTooLarge { limit }
        } else {
            MirrorError::RequestBody(e.to_string())
        }
    })
}

/// The length limit error sits somewhere in the source chain, depending on
/// whether `RequestBodyLimitLayer` or `to_bytes` tripped first.
fn exceeds_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = std::error::Error::source(err);
    }
    false
}

fn rewrite(state: &AppState, upstream: &UpstreamResponse) -> Response {
    let body = state.rewriter.rewrite(&upstream.body);
    rewritten_response(upstream, body)
}
