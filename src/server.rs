//! HTTP API server.
//!
//! Exposes segmentation, analysis, scenario import/export, and the notes
//! markdown codec as a JSON API for the browser front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/subtitles/segment` | Segment raw subtitles into scenario blocks |
//! | `POST` | `/api/scenarios/analyze` | Analyse some or all blocks (cached) |
//! | `POST` | `/api/scenario/export` | Normalize a scenario and encode it as JSON |
//! | `POST` | `/api/scenario/import` | Decode and validate scenario JSON |
//! | `POST` | `/api/notes/export` | Render the notes markdown document |
//! | `POST` | `/api/notes/import` | Parse a notes markdown document |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "empty_subtitle", "message": "no usable dialogue lines found in subtitle text" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request`, `empty_subtitle`, `no_matching_blocks`, `validation` | 400 |
//! | `missing_credentials`, `prompt_template`, `internal` | 500 |
//! | `schema_validation`, `unparsable_response`, `empty_response`, `model_error` | 502 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use subtitle_tutor_core::analysis::AnalysisConfig;
use subtitle_tutor_core::models::{AnalysisResult, NoteItem, ScenarioBlock, ScenarioSegmentation};
use subtitle_tutor_core::notes::{
    export_markdown, import_markdown, timestamp, ExportRequest, ExportTemplate, ImportResult,
};
use subtitle_tutor_core::scenario;

use crate::services::Services;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    services: Arc<Services>,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services: Arc::new(services),
        }
    }
}

/// Build the API router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/subtitles/segment", post(handle_segment))
        .route("/api/scenarios/analyze", post(handle_analyze))
        .route("/api/scenario/export", post(handle_scenario_export))
        .route("/api/scenario/import", post(handle_scenario_import))
        .route("/api/notes/export", post(handle_notes_export))
        .route("/api/notes/import", post(handle_notes_import))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(services: Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let app = router(AppState::new(services));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("Subtitle Tutor API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"empty_subtitle"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = %self.code, status = %self.status, "{}", self.message);
        } else {
            warn!(code = %self.code, status = %self.status, "{}", self.message);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// HTTP status for a core error code.
fn status_for(err: &subtitle_tutor_core::Error) -> StatusCode {
    use subtitle_tutor_core::Error;
    match err {
        Error::EmptySubtitle | Error::NoMatchingBlocks(_) | Error::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::SchemaValidation(_)
        | Error::UnparsableResponse { .. }
        | Error::EmptyResponse
        | Error::Model(_) => StatusCode::BAD_GATEWAY,
        Error::MissingCredentials | Error::PromptTemplate(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<subtitle_tutor_core::Error> for AppError {
    fn from(err: subtitle_tutor_core::Error) -> Self {
        AppError {
            status: status_for(&err),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// Unwrap a JSON body, turning extractor rejections into `bad_request`.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(value)| value).map_err(AppError::from)
}

fn non_blank(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{field} must not be empty")));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: timestamp(Utc::now()),
    })
}

// ============ POST /api/subtitles/segment ============

#[derive(Deserialize)]
struct SegmentRequest {
    subtitle: String,
    #[serde(default)]
    title: Option<String>,
}

async fn handle_segment(
    State(state): State<AppState>,
    payload: Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<Json<ScenarioSegmentation>, AppError> {
    let request = body(payload)?;
    let scenario = state
        .services
        .segmentation
        .segment(&request.subtitle, request.title.as_deref())
        .await?;
    Ok(Json(scenario))
}

// ============ POST /api/scenarios/analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    subtitle_title: String,
    blocks: Vec<ScenarioBlock>,
    #[serde(default)]
    block_indexes: Option<Vec<u32>>,
    #[serde(default)]
    config: AnalysisConfig,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    blocks: Vec<AnalysisResult>,
}

async fn handle_analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let request = body(payload)?;
    non_blank(&request.subtitle_title, "subtitle_title")?;

    let config = state.services.analysis_config(&request.config);
    let blocks = state
        .services
        .analysis
        .analyze(
            &request.subtitle_title,
            &request.blocks,
            request.block_indexes.as_deref(),
            &config,
        )
        .await?;
    Ok(Json(AnalyzeResponse { blocks }))
}

// ============ POST /api/scenario/export ============

#[derive(Deserialize)]
struct ScenarioExportRequest {
    scenario: Value,
    #[serde(default)]
    pretty: Option<bool>,
}

#[derive(Serialize)]
struct ScenarioExportResponse {
    scenario: ScenarioSegmentation,
    content: String,
    filename: String,
    #[serde(rename = "generatedAt")]
    generated_at: String,
}

async fn handle_scenario_export(
    payload: Result<Json<ScenarioExportRequest>, JsonRejection>,
) -> Result<Json<ScenarioExportResponse>, AppError> {
    let request = body(payload)?;
    let snapshot = scenario::parse_value(&request.scenario)?;
    let content = scenario::serialize(&snapshot, request.pretty.unwrap_or(true))?;

    let now = Utc::now();
    Ok(Json(ScenarioExportResponse {
        filename: scenario::export_filename(&snapshot.subtitle_title, now),
        scenario: snapshot,
        content,
        generated_at: timestamp(now),
    }))
}

// ============ POST /api/scenario/import ============

#[derive(Deserialize)]
struct ScenarioImportRequest {
    content: String,
}

#[derive(Serialize)]
struct ScenarioImportResponse {
    scenario: ScenarioSegmentation,
    #[serde(rename = "importedAt")]
    imported_at: String,
}

async fn handle_scenario_import(
    payload: Result<Json<ScenarioImportRequest>, JsonRejection>,
) -> Result<Json<ScenarioImportResponse>, AppError> {
    let request = body(payload)?;
    non_blank(&request.content, "content")?;

    let scenario = scenario::deserialize(&request.content)?;
    Ok(Json(ScenarioImportResponse {
        scenario,
        imported_at: timestamp(Utc::now()),
    }))
}

// ============ POST /api/notes/export ============

#[derive(Deserialize)]
struct NotesExportRequest {
    scenario: ScenarioSegmentation,
    #[serde(default)]
    analyses: BTreeMap<u32, String>,
    #[serde(default)]
    notes: Vec<NoteItem>,
    #[serde(default)]
    template: Option<ExportTemplate>,
}

#[derive(Serialize)]
struct NotesExportResponse {
    markdown: String,
}

async fn handle_notes_export(
    State(state): State<AppState>,
    payload: Result<Json<NotesExportRequest>, JsonRejection>,
) -> Result<Json<NotesExportResponse>, AppError> {
    let request = body(payload)?;
    let export = ExportRequest {
        scenario: request.scenario,
        analyses: request.analyses,
        notes: request.notes,
        template: request
            .template
            .unwrap_or(state.services.config.export.template),
    };

    let markdown =
        export_markdown(&export, Utc::now()).map_err(|e| internal(format!("export failed: {e}")))?;
    Ok(Json(NotesExportResponse { markdown }))
}

// ============ POST /api/notes/import ============

#[derive(Deserialize)]
struct NotesImportRequest {
    markdown: String,
}

async fn handle_notes_import(
    payload: Result<Json<NotesImportRequest>, JsonRejection>,
) -> Result<Json<ImportResult>, AppError> {
    let request = body(payload)?;
    non_blank(&request.markdown, "markdown")?;
    Ok(Json(import_markdown(&request.markdown)))
}
