//! Response handling and transformation.
//!
//! # Responsibilities
//! - Assemble the client response from a buffered upstream response
//! - Drop headers invalidated by rewriting (`Content-Length`) and hop-by-hop
//!   headers
//! - Build redirect responses for re-targeted locations

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::upstream::UpstreamResponse;

fn is_stripped_response_header(name: &HeaderName) -> bool {
    *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
        || *name == header::CONNECTION
        || *name == header::TRAILER
        || *name == header::UPGRADE
        || matches!(name.as_str(), "keep-alive" | "proxy-connection")
}

/// Copy the upstream headers that survive a body rewrite.
pub fn downstream_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !is_stripped_response_header(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Client response carrying the upstream status and headers with `body`.
pub fn rewritten_response(upstream: &UpstreamResponse, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = downstream_headers(&upstream.headers);
    response
}

/// Bodiless redirect to `location` with the upstream's status.
pub fn redirect_response(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::warn!(location = %location, "Re-targeted location is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
