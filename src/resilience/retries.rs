//! Retry logic.
//!
//! # Responsibilities
//! - Re-issue a failed fetch with the identical request
//! - Stop on the first response below 500 (4xx included)
//! - Bound the total number of attempts to `max_retries + 1`
//!
//! # Design Decisions
//! - Explicit loop with a single termination guard
//! - Transport errors and any status >= 500 are retried
//! - Malformed URLs and body-read failures are not retried
//! - Immediate retry unless a base delay is configured

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::MirrorError;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::upstream::{FetchError, Fetcher, MirroredRequest, UpstreamResponse};

/// Default number of retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;

/// Bounded retry around a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Fetch `request` until it yields a status below 500 or the retry
    /// budget is spent.
    pub async fn execute(
        &self,
        fetcher: &dyn Fetcher,
        request: &MirroredRequest,
    ) -> Result<UpstreamResponse, MirrorError> {
        let mut attempt: u32 = 0;

        loop {
            let outcome = fetcher.fetch(request).await;

            match outcome {
                Ok(response) if !is_retryable_status(response.status.as_u16()) => {
                    metrics::record_upstream_attempt("success");
                    if attempt > 0 {
                        tracing::info!(
                            url = %request.url,
                            attempt = attempt + 1,
                            status = %response.status,
                            "Upstream recovered"
                        );
                    }
                    return Ok(response);
                }
                Ok(response) => {
                    metrics::record_upstream_attempt("server_error");
                    tracing::warn!(
                        url = %request.url,
                        attempt = attempt + 1,
                        status = %response.status,
                        "Upstream server error"
                    );
                    if attempt == self.max_retries {
                        return Err(MirrorError::UpstreamStatus {
                            url: request.url.clone(),
                            status: response.status,
                            attempts: attempt + 1,
                        });
                    }
                }
                Err(e) if e.is_transient() => {
                    metrics::record_upstream_attempt("transport_error");
                    tracing::warn!(
                        url = %request.url,
                        attempt = attempt + 1,
                        error = %e,
                        "Upstream transport error"
                    );
                    if attempt == self.max_retries {
                        return Err(MirrorError::Transport {
                            url: request.url.clone(),
                            attempts: attempt + 1,
                            reason: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    metrics::record_upstream_attempt("fatal");
                    return Err(fatal_error(&request.url, e));
                }
            }

            attempt += 1;
            let delay = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Statuses that trigger another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500
}

/// Map a non-retryable fetch failure to its request-level error.
pub fn fatal_error(url: &str, error: FetchError) -> MirrorError {
    match error {
        FetchError::InvalidUrl(reason) => MirrorError::InvalidUrl {
            url: url.to_string(),
            reason,
        },
        FetchError::Body(reason) => MirrorError::BodyRead {
            url: url.to_string(),
            reason,
        },
        FetchError::Transport(reason) => MirrorError::Transport {
            url: url.to_string(),
            attempts: 1,
            reason,
        },
    }
}
