//! `GET/POST /admin/api/debug-mode`, `GET /metrics`, `GET /healthz` (§6,
//! §B.3). Grounded on the reference backend's `ApiResponse`/`AppError`
//! envelope (`utils/response.rs`) and its bearer-prefix admin check.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::utils::response::{ApiResponse, AppError};
use crate::AppState;

pub fn create_router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/api/debug-mode", get(get_debug_mode).post(set_debug_mode))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
}

/// `TK-`-prefixed bearer token, validated at the leading prefix before the
/// admin-keys list is checked (§6 "validated at the leading prefix before
/// DB lookup").
fn admin_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;
    let token = raw
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("Authorization header must be a bearer token"))?;
    if !token.starts_with("TK-") {
        return Err(AppError::unauthorized("admin token must begin with TK-"));
    }
    Ok(token)
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let token = admin_token(headers)?;
    if state.config.admin_api_keys.iter().any(|k| k == token) {
        Ok(())
    } else {
        Err(AppError::unauthorized("unknown admin token"))
    }
}

async fn get_debug_mode(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse<crate::models::DebugMode>>, AppError> {
    Ok(Json(ApiResponse::success(state.store.debug_mode().await)))
}

#[derive(Debug, Deserialize)]
struct SetDebugModeRequest {
    enabled: bool,
}

async fn set_debug_mode(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SetDebugModeRequest>,
) -> Result<Json<ApiResponse<crate::models::DebugMode>>, AppError> {
    require_admin(&state, &headers)?;
    let updated = state
        .store
        .set_debug_mode(body.enabled, "admin")
        .await
        .map_err(|err| AppError::internal(&err.to_string()))?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

async fn healthz() -> (StatusCode, Json<ApiResponse<&'static str>>) {
    (StatusCode::OK, Json(ApiResponse::success("ok")))
}
