//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{LogFormat, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, then the process
/// environment, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    normalize(&mut config);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` abstracts `std::env::var` so tests need not touch process state.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(domain) = lookup("TARGET_DOMAIN") {
        config.mirror.target_domain = domain;
    }
    if let Some(endpoint) = lookup("TARGET_ENDPOINT") {
        config.mirror.target_endpoint = Some(endpoint).filter(|e| !e.is_empty());
    }
    if let Some(domains) = lookup("SECONDARY_DOMAINS") {
        config.mirror.secondary_domains = parse_secondary_domains(&domains);
    }
    if let Some(port) = lookup("PORT").filter(|p| !p.is_empty()) {
        config.listener.port = port.parse().map_err(|_| ConfigError::Env {
            name: "PORT",
            value: port.clone(),
        })?;
    }
    if let Some(host) = lookup("HOST").filter(|h| !h.is_empty()) {
        config.listener.host = host;
    }
    if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.is_empty()) {
        config.observability.log_level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT").filter(|f| !f.is_empty()) {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => {
                return Err(ConfigError::Env {
                    name: "LOG_FORMAT",
                    value: format,
                })
            }
        };
    }
    if let Some(addr) = lookup("METRICS_ADDRESS").filter(|a| !a.is_empty()) {
        config.observability.metrics_address = Some(addr);
    }
    Ok(())
}

/// Split a `;`-separated list, dropping blank entries.
pub fn parse_secondary_domains(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect()
}

/// Trim trailing slashes so `domain + "/"` and `domain + path` are well formed.
pub fn normalize(config: &mut ProxyConfig) {
    let mirror = &mut config.mirror;
    mirror.target_domain = mirror.target_domain.trim().trim_end_matches('/').to_string();
    if let Some(endpoint) = mirror.target_endpoint.as_mut() {
        *endpoint = endpoint.trim().trim_end_matches('/').to_string();
    }
    mirror.secondary_domains.retain(|d| !d.trim().is_empty());
}
