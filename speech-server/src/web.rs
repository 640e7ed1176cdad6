use crate::lifecycle::EngineManager;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use synth::{SpeechRequest, SynthError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// State shared across HTTP handlers. The engine is injected here rather
/// than living in any global.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EngineManager>,
    /// Engine identifier reported by the health endpoint, fixed at startup.
    pub engine_name: String,
    /// Bounds in-flight synthesis calls; sized to what the underlying model
    /// runtime can safely serve concurrently.
    pub permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(engine: Arc<EngineManager>, engine_name: impl Into<String>, max_inflight: usize) -> Self {
        Self {
            engine,
            engine_name: engine_name.into(),
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: String,
}

/// Client-facing failure kinds. Whatever goes wrong inside the engine is
/// reduced to one of these plus a message string; raw errors never leave
/// the process.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("speech engine is not ready")]
    NotReady,
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<SynthError> for ApiError {
    fn from(err: SynthError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.engine.status().await.as_str(),
        engine: state.engine_name.clone(),
    })
}

pub async fn synthesize(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::Validation("text must not be empty".into()));
    }
    let engine = state.engine.engine().await.ok_or(ApiError::NotReady)?;
    let _permit = state
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::Internal("server is shutting down".into()))?;

    let request = SpeechRequest {
        text: text.to_string(),
        voice: req.voice,
        speed: req.speed,
    };
    let stream = engine.synthesize(&request).await.inspect_err(log_failure)?;
    let clip = synth::drain(stream).await.inspect_err(log_failure)?;
    info!(
        chars = request.text.len(),
        samples = clip.samples.len(),
        secs = clip.duration_secs(),
        "synthesized"
    );

    // PCM encoding is pure CPU work; keep it off the event loop.
    let wav = tokio::task::spawn_blocking(move || synth::wav::encode(&clip))
        .await
        .map_err(|e| ApiError::Internal(format!("encoding task failed: {e}")))?
        .inspect_err(log_failure)?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (
                header::CONTENT_DISPOSITION,
                "inline; filename=\"speech.wav\"",
            ),
        ],
        wav,
    )
        .into_response())
}

fn log_failure(err: &SynthError) {
    error!(%err, "synthesis request failed");
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/tts", post(synthesize))
        .with_state(state)
}
