//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mirror.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Spare time on top of the worst-case upstream budget when the inbound
/// deadline is derived.
pub const REQUEST_DEADLINE_MARGIN_SECS: u64 = 5;

/// Root configuration for the mirroring proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// What is mirrored and which origins get rewritten.
    pub mirror: MirrorConfig,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Worst case spent on upstream attempts and the backoff between them.
    pub fn upstream_budget(&self) -> Duration {
        let attempts = u64::from(self.retries.max_retries) + 1;
        Duration::from_secs(self.timeouts.upstream_secs.saturating_mul(attempts))
            + self.retries.max_total_backoff()
    }

    /// Inbound deadline: the configured value, or the upstream budget plus
    /// a margin so an exhausted retry loop still answers before it fires.
    pub fn request_deadline(&self) -> Duration {
        match self.timeouts.request_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.upstream_budget() + Duration::from_secs(REQUEST_DEADLINE_MARGIN_SECS),
        }
    }
}

/// The mirrored origin and its secondary origins.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MirrorConfig {
    /// Base URL of the origin being mirrored (e.g. "https://example.com").
    pub target_domain: String,

    /// Used instead of `target_domain` when forming upstream URLs.
    pub target_endpoint: Option<String>,

    /// Third-party origins routed through the external endpoint.
    pub secondary_domains: Vec<String>,
}

impl MirrorConfig {
    /// Base URL that inbound paths are appended to.
    pub fn upstream_base(&self) -> &str {
        match self.target_endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => endpoint,
            _ => &self.target_domain,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port to bind.
    pub port: u16,
}

impl ListenerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for handling one inbound request, retries included.
    /// Derived from the retry budget when unset.
    pub request_secs: Option<u64>,

    /// Deadline for a single upstream attempt.
    pub upstream_secs: u64,

    /// Upstream connect timeout.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: None,
            upstream_secs: 30,
            connect_secs: 5,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base delay between attempts. Zero retries immediately.
    pub base_delay_ms: u64,

    /// Upper bound for the backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::resilience::retries::MAX_RETRIES,
            base_delay_ms: 0,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Upper bound of all sleeps between attempts, jitter included.
    pub fn max_total_backoff(&self) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let per_retry = self.max_delay_ms.saturating_add(self.max_delay_ms / 10);
        Duration::from_millis(per_retry.saturating_mul(u64::from(self.max_retries)))
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Text or JSON log lines.
    pub log_format: LogFormat,

    /// Prometheus endpoint bind address. Metrics are off when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_address: None,
        }
    }
}
