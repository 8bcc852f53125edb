//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate upstream and speech URLs
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Keep the outer request timeout above the pipeline's own deadlines
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field}: unsupported scheme '{scheme}' (expected http or https)")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("timeouts.request_secs ({request:?}) must exceed the pipeline worst case ({budget:?})")]
    RequestTimeoutTooShort { request: Duration, budget: Duration },

    #[error("database.path must not be empty when the database is enabled")]
    EmptyDatabasePath,

    #[error("admin.cors_origin '{0}' is not a valid header value")]
    InvalidCorsOrigin(String),
}

/// Validate a loaded configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);

    let upstreams = &config.upstreams;
    check_url("upstreams.api", &upstreams.api, &mut errors);
    check_url("upstreams.api_tts", &upstreams.api_tts, &mut errors);
    check_url("upstreams.tts", &upstreams.tts, &mut errors);
    check_url("upstreams.res", &upstreams.res, &mut errors);

    if config.speech.is_enabled() {
        check_url("speech.rewrite_url", &config.speech.rewrite_url, &mut errors);
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.upstream_secs", timeouts.upstream_secs),
        ("timeouts.chain_secs", timeouts.chain_secs),
        ("timeouts.store_millis", timeouts.store_millis),
        ("timeouts.request_secs", timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if timeouts.request() <= timeouts.pipeline_budget() {
        errors.push(ValidationError::RequestTimeoutTooShort {
            request: timeouts.request(),
            budget: timeouts.pipeline_budget(),
        });
    }

    if config.database.enabled && config.database.path.trim().is_empty() {
        errors.push(ValidationError::EmptyDatabasePath);
    }

    if axum::http::HeaderValue::from_str(&config.admin.cors_origin).is_err() {
        errors.push(ValidationError::InvalidCorsOrigin(config.admin.cors_origin.clone()));
    }

    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::UnsupportedScheme {
            field,
            scheme: url.scheme().to_string(),
        }),
        Err(_) => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
