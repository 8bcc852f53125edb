//! Administrative API for override rules and request history.
//!
//! ```text
//! GET  /proxy-api/requests   → history rows
//! GET  /proxy-api/overrides  → override rules
//! POST /proxy-api/overrides  → 201 {"id": n}
//! ```
//!
//! Mounted only when the database is enabled. CORS allows the configured origin.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::AdminConfig;
use crate::store::{HistorySink, OverrideStore};

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn OverrideStore>,
    pub history: Arc<dyn HistorySink>,
    pub api_key: String,
}

pub fn cors_layer(origin: &str) -> Result<CorsLayer, header::InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(origin)?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            header::AUTHORIZATION,
        ]))
}

pub fn setup_admin_router(
    store: Arc<dyn OverrideStore>,
    history: Arc<dyn HistorySink>,
    config: &AdminConfig,
) -> Result<Router, header::InvalidHeaderValue> {
    let state = AdminState {
        store,
        history,
        api_key: config.api_key.clone(),
    };

    Ok(Router::new()
        .route("/proxy-api/requests", get(list_requests))
        .route(
            "/proxy-api/overrides",
            get(list_overrides).post(create_override),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(cors_layer(&config.cors_origin)?)
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HistoryRecord, SqliteStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router(api_key: &str) -> (Router, SqliteStore) {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = AdminConfig {
            api_key: api_key.to_string(),
            ..AdminConfig::default()
        };
        let router =
            setup_admin_router(Arc::new(store.clone()), Arc::new(store.clone()), &config).unwrap();
        (router, store)
    }

    fn post_rule(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/proxy-api/overrides")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_overrides() {
        let (router, _) = router("");

        let response = router
            .clone()
            .oneshot(post_rule(
                r#"{"endpoint_lookup":"/emo/","response_lookup":"greet","response_override":"{}"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"id":1}"#);

        let response = router
            .oneshot(
                Request::get("/proxy-api/overrides")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let rules: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0]["response_lookup"], "greet");
    }

    #[tokio::test]
    async fn test_empty_override_is_rejected() {
        let (router, store) = router("");
        let response = router
            .oneshot(post_rule(r#"{"endpoint_lookup":"/emo/","response_override":""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requests_lists_history() {
        let (router, store) = router("");
        store.record("/emo/q", "p", "r").await.unwrap();

        let response = router
            .oneshot(Request::get("/proxy-api/requests").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let rows: Vec<HistoryRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].endpoint, "/emo/q");
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let (router, _) = router("sekrit");

        let denied = router
            .clone()
            .oneshot(Request::get("/proxy-api/requests").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router
            .oneshot(
                Request::get("/proxy-api/requests")
                    .header(header::AUTHORIZATION, "Bearer sekrit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_headers_for_configured_origin() {
        let (router, _) = router("");
        let response = router
            .oneshot(
                Request::get("/proxy-api/overrides")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
    }
}
