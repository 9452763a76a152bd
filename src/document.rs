//! Source documents as stored on disk and handed to the Index Service.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions the ingestion pipeline accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "pdf", "md"];

/// A document persisted in the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Location on disk.
    pub path: PathBuf,
    /// Basename of `path`.
    pub filename: String,
    /// MIME type guessed from the extension.
    pub content_type: String,
}

impl Document {
    /// Describe a file on disk. The filename is always reduced to its basename.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = basename(&path.to_string_lossy());
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Self {
            path,
            filename,
            content_type,
        }
    }

    /// Read the document bytes for indexing.
    pub fn load(self) -> Result<LoadedDocument> {
        let content = std::fs::read(&self.path).map_err(|e| RagError::io(&self.path, e))?;
        Ok(LoadedDocument {
            document: self,
            content,
        })
    }
}

/// A document together with its raw bytes.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub content: Vec<u8>,
}

/// Whether a filename carries one of the supported extensions.
pub fn is_supported(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Strip any directory components, keeping the final name only.
///
/// Accepts both `/` and `\` separators since uploads and index metadata may
/// come from any platform.
pub fn basename(name: &str) -> String {
    name.rsplit(&['/', '\\'][..]).next().unwrap_or(name).to_string()
}

/// List every supported document in `dir`, sorted by path.
///
/// Hidden directories below `dir` hold uploads that are still in progress and
/// are not descended into.
pub fn collect_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_dir(e));

    let mut documents = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            RagError::io(path, std::io::Error::other(e.to_string()))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if is_supported(&name) {
            documents.push(Document::from_path(entry.path()));
        }
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}

fn is_hidden_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with('.')
}
