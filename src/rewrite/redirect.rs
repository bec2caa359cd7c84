//! Redirect re-targeting for the external route.
//!
//! A 3xx from an external origin is not relayed as-is: its `Location` gets
//! the scheme and host the client used to reach the mirror, keeping path,
//! query and fragment from the origin.

use axum::http::{header, HeaderMap, StatusCode};
use url::Url;

/// Statuses handled as redirects (300 through 308).
pub fn is_redirect(status: StatusCode) -> bool {
    (300..=308).contains(&status.as_u16())
}

/// Scheme and host the client used to reach the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundOrigin {
    pub scheme: String,
    pub host: Option<String>,
}

impl InboundOrigin {
    /// `X-Forwarded-Proto` wins over the default `http`; host comes from `Host`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "http".to_string());

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        Self { scheme, host }
    }
}

/// Rewrite `location` so it points back at the mirror.
///
/// Relative locations are resolved against `fetched`, the URL that produced
/// the redirect. Without an inbound host the result is root-relative.
pub fn retarget_location(location: &str, fetched: &Url, origin: &InboundOrigin) -> Option<String> {
    let resolved = fetched.join(location).ok()?;

    let mut target = String::new();
    if let Some(host) = &origin.host {
        target.push_str(&origin.scheme);
        target.push_str("://");
        target.push_str(host);
    }
    target.push_str(resolved.path());
    if let Some(query) = resolved.query() {
        target.push('?');
        target.push_str(query);
    }
    if let Some(fragment) = resolved.fragment() {
        target.push('#');
        target.push_str(fragment);
    }
    Some(target)
}
