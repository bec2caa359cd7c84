//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID for every inbound request
//! - Derive the upstream URL for mirrored and external requests
//! - Filter the header set forwarded upstream
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - `Accept-Encoding` is never forwarded so the origin sends an identity body
//! - Query strings are forwarded raw; only the control parameter is removed

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::form_urlencoded;
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Canonical control parameter of the external route.
pub const EXTERNAL_URL_PARAM: &str = "EXTERNAL_URL";

/// Older name of the control parameter, still accepted on the external route.
pub const LEGACY_URL_PARAM: &str = "url";

/// Headers that only make sense for a single hop.
const HOP_BY_HOP: [HeaderName; 5] = [
    header::CONNECTION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Read the request ID assigned by the middleware.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Headers forwarded upstream: everything except encoding negotiation,
/// framing, hop-by-hop headers and the control parameter.
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if is_stripped_request_header(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn is_stripped_request_header(name: &HeaderName) -> bool {
    *name == header::ACCEPT_ENCODING
        || *name == header::HOST
        || *name == header::CONTENT_LENGTH
        || HOP_BY_HOP.contains(name)
        || matches!(name.as_str(), "keep-alive" | "proxy-connection")
        || name.as_str().eq_ignore_ascii_case(EXTERNAL_URL_PARAM)
        || name.as_str().eq_ignore_ascii_case(LEGACY_URL_PARAM)
}

/// Upstream URL for a mirrored path: `base + path [+ ?query]`, with the
/// control parameter dropped from the query.
pub fn mirror_url(base: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!("{}{}", base, path);
    if let Some(query) = query.map(strip_control_param).filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(&query);
    }
    url
}

/// Drop `EXTERNAL_URL` pairs, comparing keys the way `external_target`
/// reads them (percent-decoded). Surviving pairs keep their raw encoding.
fn strip_control_param(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            form_urlencoded::parse(pair.as_bytes())
                .next()
                .map_or(true, |(key, _)| key != EXTERNAL_URL_PARAM)
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Target of an external request, `EXTERNAL_URL` first, then `url`.
pub fn external_target(query: Option<&str>) -> Option<String> {
    let query = query?;
    let mut legacy = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        if key == EXTERNAL_URL_PARAM {
            return Some(value.into_owned());
        }
        if key == LEGACY_URL_PARAM && legacy.is_none() {
            legacy = Some(value.into_owned());
        }
    }
    legacy
}
