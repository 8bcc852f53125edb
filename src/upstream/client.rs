//! reqwest-backed upstream client.

use async_trait::async_trait;
use axum::http::header;
use url::Url;

use crate::config::{TimeoutConfig, UpstreamsConfig};
use crate::upstream::{
    Credentials, OutboundRequest, RouteClass, UpstreamClient, UpstreamError, UpstreamResponse,
    SECRET_HEADER,
};

/// Build the shared outbound client with bounded connect and total timeouts.
pub fn build_http_client(
    upstreams: &UpstreamsConfig,
    timeouts: &TimeoutConfig,
    total: std::time::Duration,
) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(timeouts.connect())
        .timeout(total)
        .danger_accept_invalid_certs(upstreams.accept_invalid_certs);
    if !upstreams.use_system_proxy {
        builder = builder.no_proxy();
    }
    builder.build()
}

/// Attach the device credentials to an outbound request.
pub fn with_credentials(
    mut builder: reqwest::RequestBuilder,
    credentials: &Credentials,
) -> reqwest::RequestBuilder {
    if let Some(auth) = &credentials.authorization {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    if let Some(secret) = &credentials.secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    builder
}

/// Forwards requests to the configured host for each route class.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    upstreams: UpstreamsConfig,
}

impl HttpUpstream {
    pub fn new(upstreams: UpstreamsConfig, timeouts: &TimeoutConfig) -> reqwest::Result<Self> {
        let client = build_http_client(&upstreams, timeouts, timeouts.upstream())?;
        Ok(Self { client, upstreams })
    }

    fn base_for(&self, route: RouteClass) -> &str {
        match route {
            RouteClass::Api => &self.upstreams.api,
            RouteClass::Tts => &self.upstreams.tts,
            RouteClass::ApiTts => &self.upstreams.api_tts,
            RouteClass::Resource => &self.upstreams.res,
        }
    }

    fn target_url(&self, route: RouteClass, path_and_query: &str) -> Result<Url, UpstreamError> {
        let raw = format!("{}{}", self.base_for(route).trim_end_matches('/'), path_and_query);
        Url::parse(&raw).map_err(|e| UpstreamError::InvalidUrl(format!("{raw}: {e}")))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_connect() {
            UpstreamError::Connect(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn forward(
        &self,
        route: RouteClass,
        request: OutboundRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.target_url(route, &request.path_and_query)?;

        tracing::debug!(
            route = route.as_str(),
            method = %request.method,
            url = %url,
            "Forwarding upstream"
        );

        let mut builder = with_credentials(
            self.client.request(request.method, url),
            &request.credentials,
        );
        if let Some(body) = request.body {
            if let Some(content_type) = &request.content_type {
                builder = builder.header(header::CONTENT_TYPE, content_type);
            }
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        tracing::debug!(
            route = route.as_str(),
            status = %status,
            bytes = body.len(),
            "Upstream responded"
        );

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
