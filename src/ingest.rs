//! Ingestion pipeline: upload validation, storage, reindexing, and publication.
//!
//! An upload is handled as an [`IngestBatch`]. Files are streamed into a
//! hidden staging directory owned by the batch, so other batches never see
//! them. [`IngestBatch::commit`] moves the staged files into the data
//! directory and reindexes it inside the query service's reindex section,
//! then publishes the new version.

use crate::document::{basename, collect_documents, is_supported};
use crate::error::{RagError, Result};
use crate::index::{IndexRef, IndexService};
use crate::query::{QueryService, ReindexGuard};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Largest block handed to a single write call.
pub const WRITE_BLOCK_SIZE: usize = 1024 * 1024;

/// Message returned when an upload contained no supported file.
pub const NOTHING_PROCESSED: &str = "No files processed";

/// Prefix of per-batch staging directories inside the data directory.
const STAGING_PREFIX: &str = ".upload-";

/// Outcome of a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub rejected: Vec<String>,
    pub accepted: Vec<String>,
    /// Files that were indexed but could not be removed afterwards.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_errors: Vec<String>,
}

impl IngestReport {
    /// Human-readable summary for the HTTP response.
    pub fn message(&self) -> String {
        if self.accepted.is_empty() {
            return NOTHING_PROCESSED.to_string();
        }

        let mut lines = Vec::new();
        if !self.rejected.is_empty() {
            lines.push(format!(
                "Removed (unsupported format): {}",
                self.rejected.join(", ")
            ));
        }
        lines.push(format!("Uploaded: {}", self.accepted.join(", ")));
        if !self.cleanup_errors.is_empty() {
            lines.push(format!(
                "Failed to clean up temp files: {}",
                self.cleanup_errors.join("; ")
            ));
        }
        lines.join("\n")
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Stores uploads and keeps the index and query service in step with them.
pub struct IngestionPipeline {
    data_dir: PathBuf,
    index: Arc<dyn IndexService>,
    query: Arc<QueryService>,
}

impl IngestionPipeline {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        index: Arc<dyn IndexService>,
        query: Arc<QueryService>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            index,
            query,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Start collecting an upload.
    pub fn begin(&self) -> IngestBatch<'_> {
        IngestBatch {
            pipeline: self,
            staging: None,
            rejected: Vec::new(),
            accepted: Vec::new(),
        }
    }

    /// Make sure the query service serves an index at start-up.
    ///
    /// Uses the latest persisted version when there is one; otherwise indexes
    /// whatever is already in the data directory.
    pub async fn bootstrap(&self) -> Result<Option<IndexRef>> {
        let guard = self.query.begin_reindex().await;

        if let Some(latest) = self.index.latest().await? {
            info!(version = %latest, "Using persisted index");
            guard.publish(latest.clone()).await;
            return Ok(Some(latest));
        }

        if collect_documents(&self.data_dir)?.is_empty() {
            info!(
                data_dir = %self.data_dir.display(),
                "No persisted index and no documents to index"
            );
            return Ok(None);
        }

        info!(
            data_dir = %self.data_dir.display(),
            "No persisted index, building from data directory"
        );
        self.reindex(&guard).await.map(Some)
    }

    /// Insert every stored document, persist, and publish. Requires the reindex section.
    async fn reindex(&self, guard: &ReindexGuard<'_>) -> Result<IndexRef> {
        let documents = collect_documents(&self.data_dir)?;
        for document in documents {
            let loaded = document.load()?;
            self.index.insert(&loaded).await.map_err(|e| match e {
                RagError::Index(_) => e,
                other => RagError::Index(format!("{}: {}", loaded.document.filename, other)),
            })?;
        }

        let version = self
            .index
            .persist()
            .await
            .map_err(|e| RagError::IndexPersist(e.to_string()))?;

        guard.publish(version.clone()).await;
        Ok(version)
    }
}

/// Files of one upload on their way into the index.
///
/// Dropping a batch before [`commit`](Self::commit) removes its staging
/// directory and everything written to it.
pub struct IngestBatch<'a> {
    pipeline: &'a IngestionPipeline,
    staging: Option<TempDir>,
    rejected: Vec<String>,
    accepted: Vec<String>,
}

impl IngestBatch<'_> {
    /// Store one uploaded file, or record it as rejected.
    ///
    /// `body` is consumed block by block; a file whose extension is not
    /// supported is not read at all. On error the batch must be dropped.
    pub async fn add_file<S, E>(&mut self, filename: &str, body: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: fmt::Display,
    {
        let name = basename(filename);
        if !is_supported(&name) {
            info!(filename = %name, "Rejected upload with unsupported format");
            self.rejected.push(name);
            return Ok(());
        }

        let path = self.staging_dir().await?.join(&name);
        if !self.accepted.contains(&name) {
            self.accepted.push(name.clone());
        }

        write_stream(&path, body).await?;
        info!(filename = %name, path = %path.display(), "Staged upload");
        Ok(())
    }

    async fn staging_dir(&mut self) -> Result<PathBuf> {
        if let Some(staging) = &self.staging {
            return Ok(staging.path().to_path_buf());
        }

        let data_dir = &self.pipeline.data_dir;
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| RagError::io(data_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(data_dir)
            .map_err(|e| RagError::io(data_dir, e))?;

        let path = staging.path().to_path_buf();
        self.staging = Some(staging);
        Ok(path)
    }

    /// Move the staged files into the data directory, reindex, publish, and
    /// remove the indexed files.
    ///
    /// When nothing was accepted the index is left untouched. The whole
    /// sequence runs inside the reindex section. If indexing fails the moved
    /// files stay in the data directory so a later reindex picks them up.
    pub async fn commit(mut self) -> Result<IngestReport> {
        let mut report = IngestReport {
            rejected: std::mem::take(&mut self.rejected),
            accepted: std::mem::take(&mut self.accepted),
            cleanup_errors: Vec::new(),
        };

        let staging = self.staging.as_ref();
        let Some(staging) = staging.filter(|_| !report.accepted.is_empty()) else {
            info!(rejected = report.rejected.len(), "Nothing to index");
            return Ok(report);
        };

        let pipeline = self.pipeline;
        let guard = pipeline.query.begin_reindex().await;

        let mut stored = Vec::with_capacity(report.accepted.len());
        for name in &report.accepted {
            let from = staging.path().join(name);
            let to = pipeline.data_dir.join(name);
            tokio::fs::rename(&from, &to)
                .await
                .map_err(|e| RagError::io(&from, e))?;
            stored.push(to);
        }

        let version = pipeline.reindex(&guard).await?;
        info!(version = %version, files = report.accepted.len(), "Indexed upload");

        for path in &stored {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove indexed upload");
                report.cleanup_errors.push(format!("{}: {}", path.display(), e));
            }
        }
        drop(guard);

        Ok(report)
    }
}

impl Drop for IngestBatch<'_> {
    fn drop(&mut self) {
        if let Some(staging) = self.staging.take() {
            let path = staging.path().to_path_buf();
            if let Err(e) = staging.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove staging directory");
            }
        }
    }
}

/// Stream `body` into `path` in blocks of at most [`WRITE_BLOCK_SIZE`].
///
/// A partially written file is removed before the error is returned.
async fn write_stream<S, E>(path: &Path, body: S) -> Result<()>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: fmt::Display,
{
    let result = async {
        let mut file = tokio::fs::File::create(path).await?;
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| std::io::Error::other(e.to_string()))?;
            for block in chunk.chunks(WRITE_BLOCK_SIZE) {
                file.write_all(block).await?;
            }
        }
        file.flush().await
    }
    .await;

    if let Err(e) = result {
        if let Err(cleanup) = tokio::fs::remove_file(path).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %cleanup, "Failed to remove partial upload");
        }
        return Err(RagError::io(path, e));
    }
    Ok(())
}

/// Convenience for callers that already hold the whole file.
pub fn once(bytes: impl Into<Bytes>) -> impl Stream<Item = std::io::Result<Bytes>> {
    futures::stream::iter([Ok(bytes.into())])
}
