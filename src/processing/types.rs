//! Core data types and error definitions for the indexing pipeline.

use crate::{embedding::EmbeddingClientError, store::StoreError};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Document formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
}

impl DocumentKind {
    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// Infer the kind from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&extension)
    }

    /// Interpret a declared type: an extension (`pdf`, `.docx`) or a MIME type.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let declared = declared.trim().to_ascii_lowercase();
        match declared.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            other => Self::from_extension(other.trim_start_matches('.')),
        }
    }

    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

/// Raw text extracted from one input file.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path the text was read from.
    pub path: PathBuf,
    /// Filename recorded as provenance on every chunk.
    pub filename: String,
    /// Concatenated page/paragraph text in document order.
    pub text: String,
}

/// A bounded excerpt of a document, the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Filename of the originating document.
    pub source: String,
    /// Ordinal of the chunk within its document.
    pub position: usize,
}

/// A file handed to the upload entry point.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename.
    pub filename: String,
    /// Raw file bytes.
    pub content: Vec<u8>,
    /// Declared type: `pdf`, `docx`, or the matching MIME type.
    pub declared_type: String,
}

/// Opaque identifier of one indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Returned to the caller as soon as an indexing request is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct TaskHandle {
    /// Identifier to poll for progress.
    pub task_id: TaskId,
    /// Human-readable status line.
    pub message: String,
}

/// Outcome of a run that reached 100%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Documents extracted.
    pub documents: usize,
    /// Chunks embedded and upserted.
    pub chunks: usize,
    /// Embedding batches processed.
    pub batches: usize,
}

/// Input rejected before any background work starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// No files were supplied.
    #[error("no files supplied; upload at least one .pdf or .docx document")]
    EmptyFileSet,
    /// A file's type is not PDF or DOCX.
    #[error("unsupported file type for '{filename}': only .pdf and .docx are supported")]
    UnsupportedType {
        /// Offending filename.
        filename: String,
    },
    /// A filename cannot be used on disk.
    #[error("invalid filename '{0}'")]
    InvalidFilename(String),
}

/// Failure reading or parsing a source document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Extension is not `.pdf` or `.docx`.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// PDF parser rejected the document.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// DOCX container or XML was unreadable.
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    /// Blocking extraction task panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    Join(String),
}

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Chunk size of zero can never make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new content in every chunk.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        chunk_size: usize,
    },
}

/// Errors that abort a background indexing run.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// A document could not be extracted.
    #[error("failed to extract {path}: {source}")]
    Extraction {
        /// Document that failed.
        path: PathBuf,
        /// Extraction failure.
        #[source]
        source: ExtractionError,
    },
    /// Chunking parameters were unusable.
    #[error("failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding service failed for a batch.
    #[error("embedding service error: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index store failed to recreate or upsert.
    #[error("index store error: {0}")]
    Store(#[from] StoreError),
    /// A worker task panicked or was cancelled.
    #[error("indexing worker failed: {0}")]
    Worker(String),
}

/// Errors returned synchronously by the upload entry point.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Accepted files could not be written to the upload directory.
    #[error("failed to persist uploads: {0}")]
    Persist(#[from] std::io::Error),
}

/// Errors returned by the query interface.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Neither a vector nor a text was supplied.
    #[error("query requires either a vector or a text")]
    MissingInput,
    /// Query vector does not match the index dimensionality.
    #[error("query vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Index dimensionality.
        expected: usize,
        /// Supplied dimensionality.
        actual: usize,
    },
    /// Embedding the query text failed.
    #[error("embedding service error: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The store rejected the query.
    #[error("index store error: {0}")]
    Store(#[from] StoreError),
}

/// Parameters accepted by the query interface.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Pre-computed query vector.
    pub vector: Option<Vec<f32>>,
    /// Text to embed when no vector is supplied.
    pub text: Option<String>,
    /// Number of matches to return; defaults to 5 and is capped at 100.
    pub top_k: Option<usize>,
}
