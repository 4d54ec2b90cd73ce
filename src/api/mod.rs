// HTTP and WebSocket APIs

pub mod devices;
pub mod ingest;
pub mod websocket;

pub use devices::{create_device_router, DeviceAppState};
pub use ingest::{create_ingest_router, IngestAppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Merge every router into the service app
pub fn create_app(
    ingest: IngestAppState,
    ws: WsAppState,
    devices: DeviceAppState,
    cors_permissive: bool,
) -> Router {
    let app = Router::new()
        .merge(create_ingest_router(ingest))
        .merge(create_ws_router(Arc::new(ws)))
        .merge(create_device_router(devices));

    if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
