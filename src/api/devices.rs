use crate::api::ApiError;
use crate::auth::{authorize, AuthError, TokenVerifier};
use crate::devices::{Device, DeviceError, DeviceStore};
use axum::{
    extract::{Path, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, patch},
    Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, warn};

/// Shared state for the device API
#[derive(Clone)]
pub struct DeviceAppState {
    pub devices: Arc<dyn DeviceStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub auth_enabled: bool,
}

#[derive(Serialize)]
struct UpdateResponse {
    success: bool,
}

/// Create device router; every route requires a verified bearer token
pub fn create_device_router(state: DeviceAppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:id", patch(update_device))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

/// Auth middleware: rejects before the handler runs
async fn require_auth(
    State(state): State<Arc<DeviceAppState>>,
    req: Request,
    next: Next,
) -> Response {
    match authorize(req.headers(), state.verifier.as_ref(), state.auth_enabled).await {
        Ok(_) => next.run(req).await,
        Err(AuthError::Unavailable(msg)) => {
            error!(error = %msg, "Token verifier unavailable");
            ApiError::Unauthorized("Unauthorized: Invalid token".to_string()).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Rejected device API request");
            ApiError::Unauthorized(e.to_string()).into_response()
        }
    }
}

/// GET /api/devices
async fn list_devices(
    State(state): State<Arc<DeviceAppState>>,
) -> Result<Json<Vec<Device>>, ApiError> {
    state.devices.list().await.map(Json).map_err(|e| {
        error!(error = %e, "Failed to fetch devices");
        ApiError::Internal("Failed to fetch devices".to_string())
    })
}

/// PATCH /api/devices/:id
async fn update_device(
    State(state): State<Arc<DeviceAppState>>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<UpdateResponse>, ApiError> {
    state
        .devices
        .update(&id, body)
        .await
        .map_err(|e| match e {
            DeviceError::NotFound(_) => ApiError::NotFound(e.to_string()),
            DeviceError::InvalidPatch(_) => ApiError::BadRequest(e.to_string()),
            DeviceError::Store(_) => {
                error!(device_id = %id, error = %e, "Failed to update device");
                ApiError::Internal("Failed to update device".to_string())
            }
        })?;

    Ok(Json(UpdateResponse { success: true }))
}
