//! Outbound forwarding to the fixed upstream hosts.
//!
//! # Data Flow
//! ```text
//! Inbound request (method, path?query, headers, body)
//!     → Credentials::from_headers (Authorization, Secret only)
//!     → OutboundRequest
//!     → UpstreamClient::forward(route class)
//!     → UpstreamResponse (status, headers, buffered body)
//! ```
//!
//! # Design Decisions
//! - One static host per route class; no balancing, no retries
//! - Every call is bounded by connect + total timeouts
//! - Inbound `User-Agent` and all other headers are never forwarded

pub mod client;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode};
use thiserror::Error;

pub use client::HttpUpstream;

/// Header carrying the device secret alongside `Authorization`.
pub const SECRET_HEADER: &str = "secret";

/// Which upstream host a request is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Primary API: `/token/`, `/emo/`, `/home/` and speech synthesis.
    Api,
    /// Speech audio downloads: `/download/`.
    Tts,
    /// Speech over the API host: `/tts/`.
    ApiTts,
    /// Resources and firmware: everything else.
    Resource,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Api => "api",
            RouteClass::Tts => "tts",
            RouteClass::ApiTts => "api_tts",
            RouteClass::Resource => "res",
        }
    }
}

/// Device credentials copied from the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub authorization: Option<String>,
    pub secret: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            authorization: get(header::AUTHORIZATION.as_str()),
            secret: get(SECRET_HEADER),
        }
    }
}

/// A request to replay against an upstream host.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path plus query string, e.g. `/emo/query?lang=en`.
    pub path_and_query: String,
    pub credentials: Credentials,
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn get(path_and_query: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            method: Method::GET,
            path_and_query: path_and_query.into(),
            credentials,
            content_type: None,
            body: None,
        }
    }
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Failures of the primary forward call. These are the only errors that reach the client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream connection failed: {0}")]
    Connect(String),

    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    /// Status the client sees when the forward call fails.
    pub fn status_code(&self) -> StatusCode {
        match self {
            UpstreamError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::InvalidUrl(_) => "invalid_url",
            UpstreamError::Timeout => "timeout",
            UpstreamError::Connect(_) => "connect",
            UpstreamError::Transport(_) => "transport",
        }
    }
}

/// Performs the raw outbound HTTP call.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(
        &self,
        route: RouteClass,
        request: OutboundRequest,
    ) -> Result<UpstreamResponse, UpstreamError>;
}
