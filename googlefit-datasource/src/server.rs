use crate::backend::{
    CheckHealthHandler, CheckHealthRequest, CheckHealthResult, QueryDataHandler, QueryDataRequest,
    QueryDataResponse,
};
use crate::oauth;
use crate::state::AppState;
use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_request_body_bytes;
    Router::new()
        .route("/api/v1/query", post(query_handler))
        .route("/api/v1/health", post(check_health_handler))
        .route("/api/v1/consent-url", get(consent_url_handler))
        .route("/healthz", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryDataRequest>,
) -> Result<Json<QueryDataResponse>, StatusCode> {
    debug!("Received QueryData request");
    match state.datasource.query_data(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!("QueryData failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn check_health_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckHealthRequest>,
) -> Result<Json<CheckHealthResult>, StatusCode> {
    debug!("Received CheckHealth request");
    match state.datasource.check_health(request).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            error!("CheckHealth failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConsentParams {
    client_id: String,
    redirect_uri: String,
}

/// Link for the "Sign in with Google" button of the config page.
pub async fn consent_url_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConsentParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if params.client_id.is_empty() {
        warn!("Consent URL requested without a client ID");
        return Err(StatusCode::BAD_REQUEST);
    }
    match oauth::consent_url(
        state.datasource.endpoints(),
        &params.client_id,
        &params.redirect_uri,
    ) {
        Ok(url) => Ok(Json(json!({ "url": url.as_str() }))),
        Err(e) => {
            warn!("Cannot build consent URL: {}", e);
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

pub async fn health_handler() -> impl IntoResponse {
    // Liveness of the process only; datasource health goes through CheckHealth.
    Json(json!({ "status": "ok" }))
}
