//! Route handlers for the evaluation surface.

use super::error::{ApiError, ApiResult};
use super::middleware::{cors_layer, RequestLogger};
use crate::service::EvaluationService;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use flagship_core::Environment;
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::error;

const HEADER_API_KEY: &str = "x-api-key";

/// Shared handler state.
pub struct AppState {
    pub service: Arc<EvaluationService>,
}

/// Build the application router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/evaluate", get(evaluate_all_flags))
        .route("/evaluate/:flag_key", get(evaluate_flag))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer())
                .layer(middleware::from_fn(RequestLogger::log)),
        )
}

#[derive(Debug, Deserialize)]
struct EvaluateQuery {
    #[serde(default)]
    user: Option<String>,
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<Environment> {
    let api_key = headers
        .get(HEADER_API_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    state.service.authenticate_api_key(api_key).await.map_err(|err| {
        if !err.is_unauthorized() {
            error!(error = %err, "failed to authenticate API key");
        }
        err.into()
    })
}

async fn evaluate_flag(
    State(state): State<Arc<AppState>>,
    Path(flag_key): Path<String>,
    Query(query): Query<EvaluateQuery>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let env = authenticate(&state, &headers).await?;

    if flag_key.is_empty() {
        return Err(ApiError::BadRequest("Flag key is required".to_string()));
    }

    let user_id = query.user.unwrap_or_default();

    let result = state
        .service
        .evaluate_flag(&env, &flag_key, &user_id)
        .await
        .map_err(|err| {
            if !err.is_not_found() {
                error!(flag_key, error = %err, "failed to evaluate flag");
            }
            ApiError::from(err)
        })?;

    Ok(Json(result))
}

async fn evaluate_all_flags(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EvaluateQuery>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let env = authenticate(&state, &headers).await?;
    let user_id = query.user.unwrap_or_default();

    let result = state
        .service
        .evaluate_all_flags(&env, &user_id)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to evaluate all flags");
            ApiError::from(err)
        })?;

    Ok(Json(result))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.check_health().await {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({"status": "ready"})),
        ),
        Err(err) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "reason": err.to_string(),
            })),
        ),
    }
}
