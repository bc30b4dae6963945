//! Route handlers.

use super::{ApiError, AppState};
use crate::models::{IngestionSummary, Record};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

/// `POST /api/v0/prices`: ingests the CSV body left by the upload middleware.
pub async fn post_prices(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestionSummary>, ApiError> {
    let summary = state.service.process(body.as_ref()).await?;
    Ok(Json(summary))
}

/// `GET /api/v0/prices`: every stored record, ordered by id.
pub async fn get_prices(State(state): State<AppState>) -> Result<Json<Vec<Record>>, ApiError> {
    let records = state.service.fetch_all().await?;
    Ok(Json(records))
}

/// `GET /health`: 200 when the store answers, 503 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.service.ping().await {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
    }
}
