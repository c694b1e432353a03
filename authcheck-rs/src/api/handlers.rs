//! API request handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::audit::DomainAuditor;
use crate::error::AuthCheckError;

/// Shared application state
pub struct AppState {
    pub auditor: DomainAuditor,
}

/// Body of `POST /api/check`, also the query of `GET /check`
#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub domain: Option<String>,
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/check - Audit the domain given in the JSON body
pub async fn check_post(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckRequest>,
) -> Response {
    run_check(&state, req.domain.as_deref()).await
}

/// GET /check?domain=example.com
pub async fn check_get(
    State(state): State<Arc<AppState>>,
    Query(req): Query<CheckRequest>,
) -> Response {
    run_check(&state, req.domain.as_deref()).await
}

async fn run_check(state: &AppState, domain: Option<&str>) -> Response {
    let domain = match domain.map(str::trim) {
        Some(d) if !d.is_empty() => d,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new("Domain is required")),
            )
                .into_response()
        }
    };

    info!("Check requested for {}", domain);

    match state.auditor.audit(domain).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e @ AuthCheckError::InvalidDomain(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(&e.to_string())),
        )
            .into_response(),
        Err(e) => {
            error!("Check of {} failed: {}", domain, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(&e.to_string())),
            )
                .into_response()
        }
    }
}
