//! HTTP surface: upload analysis, entry page, static assets, health.

use crate::engine::{EngineError, EngineHandle};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use skinlens_core::{Analysis, DiagnosisCard, PipelineError};
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Upload field name for `POST /analyze`.
const UPLOAD_FIELD: &str = "file";

/// Shipped entry page, used when the static directory has no `index.html`.
const BUNDLED_INDEX: &str = include_str!("../../../frontend/index.html");

#[derive(Clone)]
pub struct AppState {
    engine: EngineHandle,
    static_dir: PathBuf,
}

impl AppState {
    pub fn new(engine: EngineHandle, static_dir: PathBuf) -> Self {
        Self { engine, static_dir }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let assets = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze))
        .route("/health", get(health))
        .nest_service("/static", assets)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("missing upload field \"file\"")]
    MissingFile,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Multipart(e) => e.status(),
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Pipeline(e)) => match e {
                PipelineError::Decode(_) => StatusCode::BAD_REQUEST,
                PipelineError::NoFaceDetected => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Classifier(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Engine(EngineError::ChannelClosed | EngineError::Spawn(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// `/analyze` body: the analysis record plus its display card.
#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    #[serde(flatten)]
    analysis: Analysis,
    card: DiagnosisCard,
}

impl From<Analysis> for AnalyzeResponse {
    fn from(analysis: Analysis) -> Self {
        let card = analysis.card();
        Self { analysis, card }
    }
}

async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let id = Uuid::new_v4();

    // Prefer the named field; otherwise take the first part that carries a file name.
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        let named = field.name() == Some(UPLOAD_FIELD);
        if named || (image.is_none() && field.file_name().is_some()) {
            image = Some(field.bytes().await?.to_vec());
            if named {
                break;
            }
        }
    }
    let image = image.ok_or(ApiError::MissingFile)?;

    tracing::info!(request = %id, bytes = image.len(), "analyze requested");
    let report = state.engine.analyze(id, image).await?;
    Ok(Json(report.analysis.into()))
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "serving bundled entry page");
            Html(BUNDLED_INDEX.to_string())
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let info = state.engine.info();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "labels": info.labels,
        "input_size": info.input_size,
        "face_policy": info.face_policy,
    }))
}
