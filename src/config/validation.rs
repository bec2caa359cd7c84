//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject a mirror with no origin before any request is served
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Keep the inbound deadline longer than every upstream attempt combined
//!
//! Returns all validation errors, not just the first.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("TARGET_DOMAIN is required")]
    MissingTargetDomain,

    #[error("{field} is not an absolute http(s) URL: {value:?}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("listener port must be non-zero")]
    ZeroPort,

    #[error("timeout {0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("request_secs ({request_secs}s) must exceed the upstream retry budget ({budget_ms}ms)")]
    DeadlineWithinRetryBudget { request_secs: u64, budget_ms: u128 },
}

/// Check a loaded config. Pure function of its input.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mirror = &config.mirror;

    if mirror.target_domain.is_empty() {
        errors.push(ValidationError::MissingTargetDomain);
    } else if !is_http_url(&mirror.target_domain) {
        errors.push(ValidationError::InvalidUrl {
            field: "TARGET_DOMAIN",
            value: mirror.target_domain.clone(),
        });
    }

    if let Some(endpoint) = mirror.target_endpoint.as_deref() {
        if !endpoint.is_empty() && !is_http_url(endpoint) {
            errors.push(ValidationError::InvalidUrl {
                field: "TARGET_ENDPOINT",
                value: endpoint.to_string(),
            });
        }
    }

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("upstream_secs"));
    }
    match config.timeouts.request_secs {
        Some(0) => errors.push(ValidationError::ZeroTimeout("request_secs")),
        Some(secs) if Duration::from_secs(secs) <= config.upstream_budget() => {
            errors.push(ValidationError::DeadlineWithinRetryBudget {
                request_secs: secs,
                budget_ms: config.upstream_budget().as_millis(),
            });
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}
