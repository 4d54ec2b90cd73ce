use crate::api::ApiError;
use crate::state::{now_seconds, AnchorBatchOutcome, StateStore, TagUpdate, WorldState};
use crate::zone::{ForbiddenZone, ZoneRegistry};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Shared state for the ingest and read-only endpoints
#[derive(Clone)]
pub struct IngestAppState {
    pub store: Arc<StateStore>,
    pub zones: Arc<ZoneRegistry>,
}

/// Create router with ingest endpoints
pub fn create_ingest_router(state: IngestAppState) -> Router {
    Router::new()
        .route("/push", get(push_tag))
        .route("/api/anchors", post(push_anchors))
        .route("/api/state", get(get_state))
        .route("/api/zones", get(get_zones))
        .with_state(Arc::new(state))
}

/// GET /push?x=&y=&z=&ts= - Tag position from the localization process
async fn push_tag(
    State(state): State<Arc<IngestAppState>>,
    query: Result<Query<TagUpdate>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let Query(update) = query.map_err(|e| {
        warn!(error = %e, "Rejected tag update query");
        ApiError::BadRequest(e.body_text())
    })?;
    let position = update.parse(now_seconds()).map_err(|e| {
        warn!(error = %e, "Rejected tag update");
        ApiError::BadRequest(e.to_string())
    })?;

    state
        .store
        .apply_tag_update(position)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(StatusCode::OK)
}

/// POST /api/anchors - Anchor drift batch `{id: {x, y, z}}`
async fn push_anchors(
    State(state): State<Arc<IngestAppState>>,
    body: Bytes,
) -> Result<Json<AnchorBatchOutcome>, ApiError> {
    let value: Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let batch = value.as_object().ok_or_else(|| {
        ApiError::BadRequest("anchor update must be a JSON object".to_string())
    })?;

    Ok(Json(state.store.apply_anchor_updates(batch)))
}

/// GET /api/state - Current world state
async fn get_state(State(state): State<Arc<IngestAppState>>) -> Json<WorldState> {
    Json(state.store.snapshot())
}

/// GET /api/zones - Mirrored forbidden zones
async fn get_zones(State(state): State<Arc<IngestAppState>>) -> Json<Vec<ForbiddenZone>> {
    Json(state.zones.list())
}
