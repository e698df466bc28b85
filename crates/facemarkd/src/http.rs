//! JSON-over-HTTP surface.
//!
//! Routes:
//!   GET  /              service metadata
//!   GET  /health        liveness
//!   POST /detect-faces  image path → face records
//!   POST /compare-faces embedding + gallery → matches

use crate::engine::{EngineError, EngineHandle};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facemark_core::{Comparison, Embedding, FaceRecord, PipelineError, DEFAULT_TOLERANCE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

const SERVICE_NAME: &str = "Face Detection Service (facemark)";
const ENGINE_NAME: &str = "SCRFD + ArcFace (ONNX Runtime)";

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

#[derive(Debug, Deserialize)]
pub struct DetectFacesRequest {
    pub image_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectFacesResponse {
    pub success: bool,
    pub faces: Vec<FaceRecord>,
    pub message: String,
    pub face_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CompareFacesRequest {
    pub face_encoding: Embedding,
    pub known_encodings: Vec<Embedding>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

/// Error surfaced to HTTP callers as `{"detail": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(format!("malformed request: {}", rejection.body_text()))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/detect-faces", post(detect_faces))
        .route("/compare-faces", post(compare_faces))
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "engine": ENGINE_NAME,
        "models_loaded": state.engine.models_loaded(),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn detect_faces(
    State(state): State<AppState>,
    payload: Result<Json<DetectFacesRequest>, JsonRejection>,
) -> Result<Json<DetectFacesResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        tracing::warn!(error = %e, "rejected detect-faces body");
        ApiError::from(e)
    })?;
    let path = request.image_path;

    match state.engine.detect(path.clone()).await {
        Ok(outcome) => {
            let face_count = outcome.face_count();
            Ok(Json(DetectFacesResponse {
                success: true,
                faces: outcome.faces,
                message: outcome.message,
                face_count,
            }))
        }
        Err(EngineError::Pipeline(PipelineError::NotFound(_))) => {
            tracing::error!(path = %path.display(), "image file not found");
            Err(ApiError::NotFound(format!("Image file not found: {}", path.display())))
        }
        Err(EngineError::Pipeline(e @ PipelineError::Undecodable { .. })) => {
            tracing::error!(path = %path.display(), error = %e, "image could not be decoded");
            Err(ApiError::InvalidInput(e.to_string()))
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, details = ?e, "error detecting faces");
            Err(ApiError::Internal(format!("Error detecting faces: {e}")))
        }
    }
}

async fn compare_faces(
    State(state): State<AppState>,
    payload: Result<Json<CompareFacesRequest>, JsonRejection>,
) -> Result<Json<Comparison>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        tracing::warn!(error = %e, "rejected compare-faces body");
        ApiError::from(e)
    })?;

    state
        .engine
        .compare(&request.face_encoding, &request.known_encodings, request.tolerance)
        .map(Json)
        .map_err(|e| match e {
            EngineError::Match(m) => {
                tracing::warn!(error = %m, query_len = request.face_encoding.len(), "invalid comparison input");
                ApiError::InvalidInput(m.to_string())
            }
            other => {
                tracing::error!(error = %other, "error comparing faces");
                ApiError::Internal(format!("Error comparing faces: {other}"))
            }
        })
}
