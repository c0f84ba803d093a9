//! HTTP surface for Rusty RAG.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /upload`: Accept multipart `files` fields (PDF or DOCX), stage them, and start a
//!   background indexing run. Responds `202` with `{ "task_id", "message" }`.
//! - `GET /progress/:task_id`: Poll a run: `{ "task_id", "progress", "status" }`, where
//!   `progress` is 0 to 100 or `-1` after a failure. Unknown ids answer `404`.
//! - `POST /query`: Nearest chunks for a vector (or a text to embed) with stored metadata.
//! - `GET /metrics`: Task and chunk counters.
//! - `GET /commands`: Machine-readable command catalog for quick discovery by tools/hosts.

use crate::processing::{
    IndexingApi, ProgressError, QueryError, QueryRequest, SubmitError, TaskHandle, TaskProgress,
    UploadedFile,
};
use crate::store::{QueryMatch, StoreError};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Multipart field names accepted as uploaded files.
const FILE_FIELDS: [&str; 2] = ["files", "file"];

/// Build the HTTP router exposing the indexing API surface.
///
/// `body_limit` caps the size of a whole upload request in bytes.
pub fn create_router<S>(service: Arc<S>, body_limit: usize) -> Router
where
    S: IndexingApi + 'static,
{
    Router::new()
        .route("/upload", post(upload_files::<S>))
        .route("/progress/:task_id", get(get_progress::<S>))
        .route("/query", post(query_index::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// Accept uploaded documents and start indexing them.
///
/// Every part named `files` (or `file`) is treated as a document. Its declared type is the
/// part's content type; parts without one fall back to the filename extension.
async fn upload_files<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TaskHandle>), AppError>
where
    S: IndexingApi,
{
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name() else { continue };
        if !FILE_FIELDS.contains(&name) {
            tracing::debug!(field = name, "Ignoring non-file multipart field");
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let declared_type = field.content_type().unwrap_or_default().to_string();
        let content = field.bytes().await?.to_vec();
        files.push(UploadedFile {
            filename,
            content,
            declared_type,
        });
    }

    let handle = service.submit(files).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

/// Response body for `GET /progress/:task_id`.
#[derive(Serialize)]
struct ProgressResponse {
    task_id: String,
    #[serde(flatten)]
    progress: TaskProgress,
}

/// Report the current progress of an indexing run.
async fn get_progress<S>(
    State(service): State<Arc<S>>,
    Path(task_id): Path<String>,
) -> Result<Json<ProgressResponse>, AppError>
where
    S: IndexingApi,
{
    let progress = service.progress(&task_id)?;
    Ok(Json(ProgressResponse { task_id, progress }))
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryBody {
    /// Pre-computed query vector.
    #[serde(default)]
    vector: Option<Vec<f32>>,
    /// Text to embed when no vector is supplied.
    #[serde(default)]
    text: Option<String>,
    /// Number of matches to return.
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    matches: Vec<MatchBody>,
}

#[derive(Serialize)]
struct MatchBody {
    id: String,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_index: Option<u64>,
}

impl From<QueryMatch> for MatchBody {
    fn from(hit: QueryMatch) -> Self {
        Self {
            text: hit.text().map(str::to_string),
            source: hit.source().map(str::to_string),
            chunk_index: hit.chunk_index(),
            id: hit.id,
            score: hit.score,
        }
    }
}

/// Return the records nearest to the supplied vector or text.
async fn query_index<S>(
    State(service): State<Arc<S>>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: IndexingApi,
{
    let matches = service
        .query(QueryRequest {
            vector: body.vector,
            text: body.text,
            top_k: body.top_k,
        })
        .await?;
    Ok(Json(QueryResponse {
        matches: matches.into_iter().map(MatchBody::from).collect(),
    }))
}

/// Return task and chunk counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: IndexingApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Upload .pdf/.docx files as multipart `files` fields. The index is rebuilt in the background; the response returns { \"task_id\": string, \"message\": string }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "progress",
                method: "GET",
                path: "/progress/:task_id",
                description: "Poll an indexing task. Progress is 0-100, or -1 when the task failed.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Return the nearest indexed chunks for a vector or a text, with stored text and source metadata.",
                request_example: Some(json!({
                    "text": "What does the contract say about renewal?",
                    "top_k": 5
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return task and chunk counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Submit(SubmitError),
    Progress(ProgressError),
    Query(QueryError),
    Multipart(MultipartError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Submit(SubmitError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Submit(SubmitError::Persist(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Progress(ProgressError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Query(QueryError::MissingInput | QueryError::DimensionMismatch { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Query(QueryError::Store(StoreError::IndexNotFound(_))) => StatusCode::NOT_FOUND,
            Self::Query(QueryError::Embedding(_) | QueryError::Store(_)) => StatusCode::BAD_GATEWAY,
            Self::Multipart(err) => err.status(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Submit(err) => err.to_string(),
            Self::Progress(err) => err.to_string(),
            Self::Query(err) => err.to_string(),
            Self::Multipart(err) => err.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "Request failed");
        } else {
            tracing::debug!(%status, error = %message, "Request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<SubmitError> for AppError {
    fn from(inner: SubmitError) -> Self {
        Self::Submit(inner)
    }
}

impl From<ProgressError> for AppError {
    fn from(inner: ProgressError) -> Self {
        Self::Progress(inner)
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self::Query(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}
