//! Response construction for proxied routes.
//!
//! # Responsibilities
//! - Build the client response for each route class
//! - Strip hop-by-hop headers when upstream headers are copied
//! - Map upstream failures to 502/504
//!
//! # Design Decisions
//! - Successful proxied responses are always 200; the upstream status is not relayed
//! - Bodies are fully buffered (they are inspected, archived and recorded)

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::upstream::UpstreamError;

pub const JSON_UTF8: &str = "application/json; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "proxy-connection",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Upstream headers safe to relay to the client. `Content-Length` is dropped too,
/// since the body is re-framed.
pub fn relayable_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

pub fn with_content_type(content_type: &'static str, body: Bytes) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
        body,
    )
        .into_response()
}

pub fn with_upstream_headers(upstream: &HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.headers_mut() = relayable_headers(upstream);
    response
}

pub fn upstream_error(error: &UpstreamError) -> Response {
    let message = match error {
        UpstreamError::Timeout => "Upstream request timed out",
        _ => "Upstream request failed",
    };
    (error.status_code(), message).into_response()
}
