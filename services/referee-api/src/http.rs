//! REST surface. Handlers only read the bootstrap's [`ReadinessState`].

use std::sync::Arc;

use axum::{
    extract::{multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit, MatchedPath, Multipart, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use referee_core::METRICS;
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::readiness::{DegradedReason, ReadinessState};

const NUMPY_SIGNATURE: &str = "NumPy 2";
const NUMPY_HINT: &str = "NumPy 2.x detected - need to downgrade to 1.x";
pub const UPLOAD_FIELD: &str = "video_file";

#[derive(Clone)]
pub struct AppState {
    pub readiness: Arc<ReadinessState>,
}

impl AppState {
    pub fn new(readiness: ReadinessState) -> Self { Self { readiness: Arc::new(readiness) } }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("ML libraries not available: {0}. Please fix NumPy version.")]
    DependenciesUnavailable(String),
    #[error("Model not loaded. Please set MODEL_URL environment variable.")]
    ModelNotLoaded,
    /// Malformed or oversized upload; carries the status axum assigned.
    #[error("{detail}")]
    BadUpload { status: StatusCode, detail: String },
}

impl ApiError {
    fn upload(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError::BadUpload { status, detail: detail.into() }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self { ApiError::upload(e.status(), e.body_text()) }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self { ApiError::upload(e.status(), e.body_text()) }
}

impl From<&DegradedReason> for ApiError {
    fn from(reason: &DegradedReason) -> Self {
        match reason {
            DegradedReason::DependenciesUnavailable { error } => ApiError::DependenciesUnavailable(error.clone()),
            DegradedReason::ModelNotLoaded => ApiError::ModelNotLoaded,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::DependenciesUnavailable(_) | ApiError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadUpload { status, .. } => status,
        };
        (status, Json(json!({"detail": self.to_string()}))).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/score_video", post(score_video))
        .route("/score_video/", post(score_video))
        .merge(referee_core::health_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

/// Wide open: any origin, method and header.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn track_requests(req: Request, next: Next) -> Response {
    let route = req.extensions().get::<MatchedPath>().map(|p| p.as_str().to_owned()).unwrap_or_else(|| "unmatched".into());
    let resp = next.run(req).await;
    METRICS.http_requests_total.with_label_values(&[route.as_str(), resp.status().as_str()]).inc();
    resp
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    let r = &state.readiness;
    let profile = r.profile();
    Json(json!({
        "message": "AI Basketball Referee API",
        "status": if r.model_loaded() { "ready" } else { "limited" },
        "ml_available": r.dependencies_available(),
        "model_loaded": r.model_loaded(),
        "endpoints": {
            "root": "/",
            "status": "/status",
            "health": "/health",
            "score_video": "/score_video",
            "metrics": "/metrics",
        },
        "deployment": {
            "platform": profile.platform(),
            "url": profile.public_url(),
        },
        "error": r.import_error(),
    }))
}

fn numpy_hint(import_error: Option<&str>) -> Option<&'static str> {
    import_error.filter(|e| e.contains(NUMPY_SIGNATURE)).map(|_| NUMPY_HINT)
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let r = &state.readiness;
    Json(json!({
        "api": "online",
        "ml_libraries": {
            "available": r.dependencies_available(),
            "error": r.import_error(),
        },
        "model": {
            "loaded": r.model_loaded(),
            "path": r.model_path().display().to_string(),
            "exists": r.model_path().exists(),
            "url_set": r.model_url_configured(),
        },
        "environment": {
            "platform": r.profile().platform(),
            "service_version": env!("CARGO_PKG_VERSION"),
            "numpy_issue": numpy_hint(r.import_error()),
        },
        "bootstrap": r.bootstrap(),
    }))
}

/// Accepts the upload once the scorer is loaded. Analysis itself belongs to
/// the external scorer, so the response only acknowledges what arrived.
async fn score_video(
    State(state): State<AppState>,
    upload: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let scorer = state.readiness.scorer().map_err(ApiError::from)?;
    let mut multipart = upload?;
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) { continue; }
        let filename = field.file_name().map(str::to_owned);
        let mut bytes = 0usize;
        while let Some(chunk) = field.chunk().await? {
            bytes += chunk.len();
        }
        debug!(target: "referee-api", ?filename, bytes, backend = scorer.backend(), "video received");
        return Ok(Json(json!({
            "message": "Video processing endpoint",
            "filename": filename,
            "bytes": bytes,
        })));
    }
    Err(ApiError::upload(StatusCode::UNPROCESSABLE_ENTITY, format!("missing multipart field `{UPLOAD_FIELD}`")))
}
