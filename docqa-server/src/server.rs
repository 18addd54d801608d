use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use docqa_rag::{ErrorKind, Page, RagError, RagService, RetrievedChunk};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::bootstrap::read_text_document;
use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RagService>,
}

impl AppState {
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service }
    }
}

/// Body of `POST /ingest`: exactly one of `pages` or `file_path`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub pages: Option<Vec<Page>>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Treat the pages as the new content of their sources, removing older
    /// chunks once the new ones are committed.
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub chunks_added: usize,
    pub chunks_removed: usize,
    pub pages_skipped: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub llm_answer: String,
    pub mode: String,
    pub retrieved_chunks: Vec<RetrievedChunk>,
}

/// Failure returned by a handler, rendered as `{error, message}`.
#[derive(Debug)]
pub enum ApiError {
    Rag(RagError),
    NotFound(String),
    BadRequest(String),
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        ApiError::Rag(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Rag(err) => match err.kind() {
                ErrorKind::InvalidQuery | ErrorKind::Configuration => StatusCode::BAD_REQUEST,
                ErrorKind::Collaborator => StatusCode::BAD_GATEWAY,
                ErrorKind::IndexWrite | ErrorKind::IndexRead => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, message) = match self {
            ApiError::Rag(err) => (err.kind().as_str(), err.user_message()),
            ApiError::NotFound(message) => ("not_found", message),
            ApiError::BadRequest(message) => ("invalid_request", message),
        };
        (status, Json(json!({ "error": error, "message": message }))).into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status))
        .route("/list-docs", get(list_docs))
        .route("/ingest", post(ingest))
        .route("/query", post(query))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(settings: &Settings, service: Arc<RagService>) -> anyhow::Result<()> {
    let app = app_router(AppState::new(service));
    let listener = tokio::net::TcpListener::bind(settings.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_address()))?;
    info!("docqa listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.service.status().await?;
    Ok(Json(json!({
        "status": "ok",
        "indexed_chunks": status.indexed_chunks,
        "metric": status.metric,
    })))
}

async fn list_docs(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let documents = state.service.list_sources().await?;
    Ok(Json(json!({ "documents": documents })))
}

async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let pages = match (request.pages, request.file_path) {
        (Some(pages), None) => pages,
        (None, Some(path)) => match read_text_document(&path).await {
            Ok(document) => document.pages,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::NotFound(format!("file not found: {}", path.display())));
            }
            Err(e) => {
                return Err(ApiError::BadRequest(format!("cannot read {}: {e}", path.display())));
            }
        },
        _ => {
            return Err(ApiError::BadRequest(
                "provide exactly one of `pages` or `file_path`".to_string(),
            ));
        }
    };

    let report = if request.replace {
        state.service.ingest_replacing(&pages).await?
    } else {
        state.service.ingest(&pages).await?
    };
    Ok(Json(IngestResponse {
        status: "success".to_string(),
        chunks_added: report.chunks_added,
        chunks_removed: report.chunks_removed,
        pages_skipped: report.pages_skipped,
    }))
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let answer = state.service.query(&request.query, request.top_k).await?;
    Ok(Json(QueryResponse {
        llm_answer: answer.answer,
        mode: answer.mode.to_string(),
        retrieved_chunks: answer.evidence,
    }))
}
