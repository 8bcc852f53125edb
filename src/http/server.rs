//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared application state from configuration
//! - Create the Axum router for every route class
//! - Wire up middleware (tracing, request ID, timeout, body limit)
//! - Mount the admin API when the database is enabled
//! - Serve until the shutdown signal fires

use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::archive::BodyArchive;
use crate::config::ProxyConfig;
use crate::http::handlers;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::interception::{Interceptor, OverrideResolver, SpeechChain};
use crate::store::{HistoryRecorder, SqliteStore};
use crate::upstream::{HttpUpstream, UpstreamClient};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub interceptor: Arc<Interceptor>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub archive: Arc<BodyArchive>,
    pub history: Option<HistoryRecorder>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid CORS origin: {0}")]
    Cors(#[from] axum::http::header::InvalidHeaderValue),
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Build the server. `store` is the opened database, present only when enabled.
    pub fn new(config: ProxyConfig, store: Option<SqliteStore>) -> Result<Self, ServerError> {
        let upstream: Arc<dyn UpstreamClient> =
            Arc::new(HttpUpstream::new(config.upstreams.clone(), &config.timeouts)?);
        Self::with_upstream(config, upstream, store)
    }

    /// Build the server around an existing upstream client.
    pub fn with_upstream(
        config: ProxyConfig,
        upstream: Arc<dyn UpstreamClient>,
        store: Option<SqliteStore>,
    ) -> Result<Self, ServerError> {
        let mut interceptor = Interceptor::new(upstream.clone());
        if let Some(chain) =
            SpeechChain::from_config(&config.speech, &config.upstreams, &config.timeouts)?
        {
            interceptor = interceptor.with_chain(chain);
        }

        let mut history = None;
        let mut admin = None;
        if let Some(store) = store {
            let recorder = HistoryRecorder::new(Arc::new(store.clone()), config.timeouts.store());
            interceptor = interceptor
                .with_resolver(OverrideResolver::new(
                    Arc::new(store.clone()),
                    config.timeouts.store(),
                ))
                .with_history(recorder.clone());
            history = Some(recorder);
            admin = Some(setup_admin_router(
                Arc::new(store.clone()),
                Arc::new(store),
                &config.admin,
            )?);
        }

        let state = AppState {
            interceptor: Arc::new(interceptor),
            upstream,
            archive: Arc::new(BodyArchive::new(&config.archive)),
            history,
        };

        let router = Self::build_router(&config, state, admin);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState, admin: Option<Router>) -> Router {
        let mut router = Router::new()
            .route("/time", get(handlers::time))
            .route("/app/", any(handlers::app_status))
            .route("/app/{*rest}", any(handlers::app_status))
            .route("/download/", any(handlers::download))
            .route("/download/{*rest}", any(handlers::download))
            .route("/tts/", any(handlers::tts))
            .route("/tts/{*rest}", any(handlers::tts));

        for prefix in ["/token", "/emo", "/home"] {
            router = router
                .route(&format!("{prefix}/"), any(handlers::api))
                .route(&format!("{prefix}/{{*rest}}"), any(handlers::api));
        }

        let mut router = router.fallback(handlers::resource).with_state(state);
        if let Some(admin) = admin {
            router = router.merge(admin);
        }

        router
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// Serve on `listener` until a message arrives on `shutdown`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            database = self.config.database.enabled,
            speech_chain = self.config.speech.is_enabled(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The assembled router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
