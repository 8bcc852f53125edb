//! Route handlers.
//!
//! `/token/`, `/emo/` and `/home/` go through the interception pipeline. `/download/`,
//! `/tts/` and everything else are plain forwards with archival and history. `/time`
//! and `/app/` are answered locally.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::Response,
    Json,
};
use chrono::Local;
use serde::Serialize;

use crate::archive::ArchiveKind;
use crate::http::request::{content_type, path_and_query, request_id};
use crate::http::response::{self, JSON_UTF8, OCTET_STREAM};
use crate::http::server::AppState;
use crate::interception::InboundRequest;
use crate::observability::metrics;
use crate::upstream::{Credentials, OutboundRequest, RouteClass, UpstreamResponse};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TimeResponse {
    pub time: i64,
    /// Local UTC offset in seconds.
    pub offset: i32,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AppStatus {
    pub code: u16,
    pub errmessage: &'static str,
}

pub async fn time() -> Json<TimeResponse> {
    let now = Local::now();
    Json(TimeResponse {
        time: now.timestamp(),
        offset: now.offset().local_minus_utc(),
    })
}

pub async fn app_status() -> Json<AppStatus> {
    Json(AppStatus {
        code: 200,
        errmessage: "OK",
    })
}

/// Assistant API: forward, then override/merge/chain.
pub async fn api(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let route = RouteClass::Api.as_str();
    let content_type = content_type(&headers);

    if method == Method::POST {
        state
            .archive
            .store(
                ArchiveKind::ApiRequest,
                content_type.as_deref().unwrap_or_default(),
                &body,
            )
            .await;
    }

    let inbound = InboundRequest {
        request_id: request_id(&headers),
        method,
        path_and_query: path_and_query(&uri),
        credentials: Credentials::from_headers(&headers),
        content_type,
        body,
    };

    match state.interceptor.handle(inbound).await {
        Ok(intercepted) => {
            metrics::record_request(route, 200, start);
            response::with_content_type(JSON_UTF8, intercepted.body)
        }
        Err(e) => {
            metrics::record_request(route, e.status_code().as_u16(), start);
            response::upstream_error(&e)
        }
    }
}

/// Speech audio from the TTS host. History keeps only the endpoint.
pub async fn download(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let endpoint = path_and_query(&uri);
    let upstream = match forward_plain(&state, RouteClass::Tts, &endpoint, &headers, start).await {
        Ok(upstream) => upstream,
        Err(response) => return response,
    };

    archive_response(&state, ArchiveKind::Tts, &upstream).await;
    if let Some(history) = &state.history {
        history.record(&endpoint, "", b"").await;
    }

    metrics::record_request(RouteClass::Tts.as_str(), 200, start);
    response::with_content_type(OCTET_STREAM, upstream.body)
}

/// Speech over the API host.
pub async fn tts(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let endpoint = path_and_query(&uri);
    let upstream = match forward_plain(&state, RouteClass::ApiTts, &endpoint, &headers, start).await
    {
        Ok(upstream) => upstream,
        Err(response) => return response,
    };

    archive_response(&state, ArchiveKind::ApiTts, &upstream).await;
    if let Some(history) = &state.history {
        history.record(&endpoint, "", &upstream.body).await;
    }

    metrics::record_request(RouteClass::ApiTts.as_str(), 200, start);
    response::with_content_type(OCTET_STREAM, upstream.body)
}

/// Resources and firmware: every path without a dedicated route.
pub async fn resource(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let start = Instant::now();
    let endpoint = path_and_query(&uri);
    let upstream =
        match forward_plain(&state, RouteClass::Resource, &endpoint, &headers, start).await {
            Ok(upstream) => upstream,
            Err(response) => return response,
        };

    archive_response(&state, ArchiveKind::Resource, &upstream).await;
    if let Some(history) = &state.history {
        history.record(&endpoint, "", &upstream.body).await;
    }

    metrics::record_request(RouteClass::Resource.as_str(), 200, start);
    response::with_upstream_headers(&upstream.headers, upstream.body)
}

async fn forward_plain(
    state: &AppState,
    route: RouteClass,
    endpoint: &str,
    headers: &HeaderMap,
    start: Instant,
) -> Result<UpstreamResponse, Response> {
    let request = OutboundRequest::get(endpoint, Credentials::from_headers(headers));
    state.upstream.forward(route, request).await.map_err(|e| {
        tracing::error!(
            request_id = %request_id(headers).unwrap_or_default(),
            route = route.as_str(),
            endpoint = %endpoint,
            error = %e,
            "Upstream forward failed"
        );
        metrics::record_upstream_error(route.as_str(), e.kind());
        metrics::record_request(route.as_str(), e.status_code().as_u16(), start);
        response::upstream_error(&e)
    })
}

async fn archive_response(state: &AppState, kind: ArchiveKind, upstream: &UpstreamResponse) {
    state
        .archive
        .store(kind, upstream.content_type().unwrap_or_default(), &upstream.body)
        .await;
}
