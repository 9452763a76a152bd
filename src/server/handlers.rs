//! Request handlers for the question-answering surface.

use super::error::ApiError;
use super::state::AppState;
use crate::error::RagError;
use crate::query::QueryResult;
use axum::{
    Json,
    extract::{Multipart, Query, State},
    response::Html,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub const NO_FILES_MESSAGE: &str = "No files detected. Please upload at least one file.";

const MISSING_PAGE: &str = "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>CloudBase RAG</title></head>\
<body><h1>Chat interface not found</h1><p>The chat page is not installed on this server. \
Use <code>GET /query?query=...</code> or <code>POST /ingest</code> directly.</p></body></html>\n";

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
    #[serde(default)]
    pub rejected: Vec<String>,
    #[serde(default)]
    pub accepted: Vec<String>,
}

/// Message of an I/O failure without the server-side path.
fn io_message(err: &RagError) -> String {
    match err {
        RagError::Io { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// POST /ingest
pub async fn ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut batch = state.ingestion.begin();
    let mut files = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart field: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string).filter(|n| !n.is_empty())
        else {
            debug!(field = ?field.name(), "Skipping multipart field without filename");
            continue;
        };

        files += 1;
        if let Err(e) = batch.add_file(&filename, field).await {
            error!(filename = %filename, error = %e, "Failed to store upload");
            return Err(ApiError::internal(format!(
                "Failed to process file {}: {}",
                filename,
                io_message(&e)
            )));
        }
    }

    if files == 0 {
        return Err(ApiError::bad_request(NO_FILES_MESSAGE));
    }

    let report = batch.commit().await.map_err(|e| {
        error!(error = %e, kind = e.kind(), "Ingestion failed");
        match e {
            RagError::IndexPersist(_) => {
                ApiError::internal(format!("Failed to update index and query engine: {}", e))
            }
            other => ApiError::internal(format!(
                "Failed to store file in index: {}",
                io_message(&other)
            )),
        }
    })?;

    if !report.cleanup_errors.is_empty() {
        warn!(failures = report.cleanup_errors.len(), "Indexed uploads left on disk");
    }

    Ok(Json(IngestResponse {
        message: report.message(),
        rejected: report.rejected,
        accepted: report.accepted,
    }))
}

/// GET /query
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let answer = state
        .query
        .query(&params.query)
        .await
        .map_err(query_error)?;

    Ok(Json(QueryResponse {
        query: params.query,
        results: answer,
    }))
}

/// GET /query_with_context
pub async fn query_with_context(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = state
        .query
        .query_with_context(&params.query)
        .await
        .map_err(query_error)?;
    Ok(Json(result))
}

fn query_error(err: RagError) -> ApiError {
    if err.is_client_error() {
        return ApiError::from(err);
    }
    error!(error = %err, kind = err.kind(), "Query failed");
    ApiError::internal(format!("Failed to process query: {}", err))
}

/// GET /
pub async fn index_page(State(state): State<AppState>) -> Html<String> {
    match tokio::fs::read_to_string(&state.chat_page).await {
        Ok(page) => Html(page),
        Err(e) => {
            warn!(path = %state.chat_page.display(), error = %e, "Chat page unavailable");
            Html(MISSING_PAGE.to_string())
        }
    }
}
