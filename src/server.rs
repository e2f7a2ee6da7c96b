//! HTTP API for study-material generation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/study-material` | Generate a summary, study guide, or practice quiz |
//! | `POST` | `/explanation` | Explain one concept at a skill level |
//! | `POST` | `/adjust-difficulty` | Rewrite existing content for another skill level |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every failure carries a single user-facing message:
//!
//! ```json
//! { "success": false, "code": "bad_request", "error": "Document text is empty." }
//! ```
//!
//! | Status | Code | When |
//! |--------|------|------|
//! | 400 | `bad_request` | malformed body or invalid input |
//! | 413 | `too_large` | body exceeds `[server].max_body_bytes` |
//! | 502 | `generation_failed` | the model could not produce valid content |
//! | 504 | `timeout` | the run exceeded `[server].request_timeout_secs` |
//!
//! A client that disconnects mid-request drops the handler future, which
//! cancels the run and its outstanding model calls.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! can call the API directly.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use study_forge_core::models::{
    ContentType, MaterialRequest, MaterialType, SkillLevel, UnknownVariant,
};
use study_forge_core::prompt::Style;
use study_forge_core::validate::validate_content;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::GenerationError;
use crate::generate::{Explanation, GenerationClient};
use crate::llm::ChatModel;
use crate::pipeline::{CancelSignal, Pipeline};
use crate::retry::retry;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pipeline: Arc<Pipeline>,
}

/// Bind `[server].bind` and serve until Ctrl-C.
pub async fn run_server(config: &Config, model: Arc<dyn ChatModel>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    serve(listener, config, model).await
}

/// Serve on an already-bound listener.
///
/// The generation client lives as long as the server; it is closed once
/// the server has drained.
pub async fn serve(
    listener: TcpListener,
    config: &Config,
    model: Arc<dyn ChatModel>,
) -> anyhow::Result<()> {
    if !config.model.is_enabled() {
        warn!("model provider is disabled; generation requests will fail");
    }
    let client = GenerationClient::new(model, config);
    let pipeline = Arc::new(Pipeline::new(client.clone(), config));
    let app = router(pipeline, Arc::new(config.clone()));

    info!(
        addr = %listener.local_addr()?,
        model = client.model_name(),
        "study material server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    client.close();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub fn router(pipeline: Arc<Pipeline>, config: Arc<Config>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = config.server.max_body_bytes;
    let state = AppState { config, pipeline };

    Router::new()
        .route("/study-material", post(handle_study_material))
        .route("/explanation", post(handle_explanation))
        .route("/adjust-difficulty", post(handle_adjust_difficulty))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    code: &'static str,
    error: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            code: self.code,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn too_large(limit_bytes: usize) -> AppError {
    AppError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        code: "too_large",
        message: format!(
            "Document too large. The limit is {}; try a shorter document.",
            human_size(limit_bytes)
        ),
    }
}

fn human_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    if bytes >= MB {
        format!("{} MB", bytes / MB)
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}

fn generation_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "generation_failed",
        message: message.into(),
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::GATEWAY_TIMEOUT,
        code: "timeout",
        message: message.into(),
    }
}

/// Map a JSON body rejection, singling out bodies over the size limit.
fn rejection_error(rejection: JsonRejection, limit_bytes: usize) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(limit_bytes, "request body over limit");
        too_large(limit_bytes)
    } else {
        bad_request(rejection.body_text())
    }
}

fn parse_level(raw: Option<&str>) -> Result<Option<SkillLevel>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e: UnknownVariant| bad_request(e.to_string())),
    }
}

fn generation_message(what: &str, err: &GenerationError) -> AppError {
    generation_failed(format!("Failed to generate {}: {}", what, err))
}

// ============ POST /study-material ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudyMaterialBody {
    #[serde(default)]
    document_text: String,
    #[serde(default)]
    material_type: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    complexity: Option<String>,
    #[serde(default)]
    skill_level: Option<String>,
    #[serde(default)]
    number_of_questions: Option<i64>,
    #[serde(default)]
    adjust_difficulty: Option<bool>,
}

impl StudyMaterialBody {
    fn into_request(self) -> Result<MaterialRequest, AppError> {
        let material_type: MaterialType = self
            .material_type
            .parse()
            .map_err(|e: UnknownVariant| bad_request(e.to_string()))?;

        let number_of_questions = match self.number_of_questions {
            Some(n) if n < 0 => {
                return Err(bad_request("numberOfQuestions must not be negative."))
            }
            Some(n) => Some(n as usize),
            None => None,
        };

        Ok(MaterialRequest {
            document_text: self.document_text,
            material_type,
            skill_level: parse_level(self.skill_level.as_deref())?,
            subject: self.subject,
            complexity: self.complexity,
            number_of_questions,
            adjust_difficulty: self.adjust_difficulty,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudyMaterialResponse {
    success: bool,
    content: String,
    truncated: bool,
}

async fn handle_study_material(
    State(state): State<AppState>,
    payload: Result<Json<StudyMaterialBody>, JsonRejection>,
) -> Result<Json<StudyMaterialResponse>, AppError> {
    let Json(body) = payload.map_err(|r| rejection_error(r, state.config.server.max_body_bytes))?;
    let request = body.into_request()?;
    let material = request.material_type;

    let limit = Duration::from_secs(state.config.server.request_timeout_secs);
    let (outcome, run) = tokio::time::timeout(
        limit,
        state.pipeline.run_with_report(&request, &CancelSignal::never()),
    )
    .await
    .map_err(|_| {
        timeout_error(format!(
            "Generating the {} took too long. Try a shorter document.",
            material.label()
        ))
    })?;

    if let Err(e) = &outcome {
        warn!(request_id = %run.request_id(), error = %e, "study material request failed");
    }

    match outcome {
        Ok(result) => Ok(Json(StudyMaterialResponse {
            success: true,
            content: result.content,
            truncated: result.truncated,
        })),
        Err(e) if e.is_input() => Err(bad_request(e.user_message(material))),
        Err(e) => Err(generation_failed(e.user_message(material))),
    }
}

// ============ POST /explanation ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplanationBody {
    #[serde(default)]
    concept: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    skill_level: Option<String>,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Serialize)]
struct ExplanationResponse {
    success: bool,
    explanation: Explanation,
}

async fn handle_explanation(
    State(state): State<AppState>,
    payload: Result<Json<ExplanationBody>, JsonRejection>,
) -> Result<Json<ExplanationResponse>, AppError> {
    let Json(body) = payload.map_err(|r| rejection_error(r, state.config.server.max_body_bytes))?;
    let concept = body.concept.trim();
    if concept.is_empty() {
        return Err(bad_request("concept must not be empty."));
    }
    let level = parse_level(body.skill_level.as_deref())?.unwrap_or_default();
    let style = Style::new(level).with_subject(body.subject);
    let context = body.context.as_deref().filter(|c| !c.trim().is_empty());
    let client = state.pipeline.client();

    let explanation = retry(
        state.pipeline.retry_policy(),
        "explanation",
        GenerationError::is_retryable,
        |_| client.explain(concept, context, &style),
    )
    .await
    .map_err(|e| generation_message("explanation", &e))?;

    Ok(Json(ExplanationResponse {
        success: true,
        explanation,
    }))
}

// ============ POST /adjust-difficulty ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustBody {
    content: Value,
    content_type: String,
    from_level: String,
    to_level: String,
    #[serde(default = "default_preserve_core")]
    preserve_core: bool,
    #[serde(default)]
    subject: Option<String>,
}

fn default_preserve_core() -> bool {
    true
}

#[derive(Serialize)]
struct AdjustResponse {
    success: bool,
    content: Value,
    adjusted: bool,
}

async fn handle_adjust_difficulty(
    State(state): State<AppState>,
    payload: Result<Json<AdjustBody>, JsonRejection>,
) -> Result<Json<AdjustResponse>, AppError> {
    let Json(body) = payload.map_err(|r| rejection_error(r, state.config.server.max_body_bytes))?;
    let content_type: ContentType = body
        .content_type
        .parse()
        .map_err(|e: UnknownVariant| bad_request(e.to_string()))?;
    let from = parse_level(Some(&body.from_level))?
        .ok_or_else(|| bad_request("fromLevel is required."))?;
    let to = parse_level(Some(&body.to_level))?
        .ok_or_else(|| bad_request("toLevel is required."))?;
    validate_content(content_type, &body.content)
        .map_err(|e| bad_request(format!("content is not a valid {}: {}", content_type, e)))?;

    let target = Style::new(to).with_subject(body.subject);
    let (content, adjusted) = state
        .pipeline
        .adjuster()
        .adjust_or_keep(&body.content, content_type, from, &target, body.preserve_core)
        .await
        .map_err(|e| generation_message("adjusted content", &e))?;

    Ok(Json(AdjustResponse {
        success: true,
        content,
        adjusted,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
