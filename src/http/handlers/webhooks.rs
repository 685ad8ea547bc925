use crate::webhook::gateway::IngestResult;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn ingest(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    match state.webhook_gateway.ingest(&provider_name, &body, &headers).await {
        Ok(IngestResult::Accepted) => {
            (StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response()
        }
        Ok(IngestResult::Rejected { reason }) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "reason": reason }))).into_response()
        }
        Err(e) => {
            tracing::error!(provider = %provider_name, "webhook ingestion failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "reason": "internal_error" })),
            )
                .into_response()
        }
    }
}
