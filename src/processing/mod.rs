//! Document indexing pipeline: extraction, chunking, batching, embedding, and upsert.

pub mod batching;
pub mod chunking;
pub mod extract;
pub mod progress;
mod service;
pub mod types;
pub mod upload;

pub use progress::{
    PROGRESS_COMPLETE, PROGRESS_FAILED, ProgressError, ProgressRegistry, TaskProgress, TaskStatus,
};
pub use service::{IndexingApi, IndexingService, IndexingSettings};
pub use types::{
    Chunk, ChunkingError, DocumentKind, ExtractionError, IndexingError, QueryError, QueryRequest,
    RunSummary, SourceDocument, SubmitError, TaskHandle, TaskId, UploadedFile, ValidationError,
};
