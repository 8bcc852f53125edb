use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::store::{HistoryRecord, NewOverrideRule, OverrideRule, StoreError};

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
        .into_response()
}

fn store_error(e: StoreError) -> Response {
    tracing::error!(error = %e, "Admin store operation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub async fn list_requests(
    State(state): State<AdminState>,
) -> Result<Json<Vec<HistoryRecord>>, Response> {
    state.history.list().await.map(Json).map_err(store_error)
}

pub async fn list_overrides(
    State(state): State<AdminState>,
) -> Result<Json<Vec<OverrideRule>>, Response> {
    state.store.list_all().await.map(Json).map_err(store_error)
}

pub async fn create_override(
    State(state): State<AdminState>,
    Json(rule): Json<NewOverrideRule>,
) -> Response {
    if rule.response_override.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "response_override must not be empty");
    }

    match state.store.insert(rule).await {
        Ok(id) => {
            tracing::info!(rule_id = id, "Override rule added");
            (StatusCode::CREATED, Json(Created { id })).into_response()
        }
        Err(e) => store_error(e),
    }
}
