//! Indexing service coordinating extraction, chunking, embedding, and vector store writes.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, build_embedding_client},
    metrics::{IndexingMetrics, MetricsSnapshot},
    processing::{
        batching::{Batch, TokenCounter, build_token_counter, plan_batches},
        chunking::chunk_document,
        extract::extract_document,
        progress::{
            PROGRESS_COMPLETE, PROGRESS_STARTED, ProgressError, ProgressRegistry, TaskProgress,
            banded_progress,
        },
        types::{
            Chunk, DocumentKind, IndexingError, QueryError, QueryRequest, RunSummary, SubmitError,
            TaskHandle, TaskId, UploadedFile, ValidationError,
        },
        upload::{persist_uploads, remove_task_dir, task_upload_dir, validate_uploads},
    },
    store::{
        IndexSpec, QueryMatch, RecordMetadata, VectorRecord, VectorStore, build_vector_store,
        compute_chunk_hash, current_timestamp_rfc3339,
    },
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};

const DEFAULT_TOP_K: usize = 5;
const MAX_TOP_K: usize = 100;

/// Tunables for one service instance, resolved from [`Config`] at startup.
#[derive(Debug, Clone)]
pub struct IndexingSettings {
    /// Index recreated at the start of every run.
    pub index: IndexSpec,
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,
    /// Token ceiling for one embedding request.
    pub max_input_tokens: usize,
    /// Concurrent batch workers per run.
    pub workers: usize,
    /// Root directory for staged uploads.
    pub upload_dir: PathBuf,
    /// Model whose tokenizer measures batch token counts.
    pub tokenizer_model: String,
}

impl IndexingSettings {
    /// Derive settings from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            index: IndexSpec {
                name: config.index_name.clone(),
                dimension: config.embedding_dimension,
                metric: config.index_metric,
            },
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            max_input_tokens: config.max_input_tokens,
            workers: config.indexing_workers,
            upload_dir: config.upload_dir.clone(),
            tokenizer_model: config.embedding_model.clone(),
        }
    }

    /// Maximum chunks per embedding batch: `max_input_tokens / chunk_size`, at least one.
    pub fn batch_size(&self) -> usize {
        (self.max_input_tokens / self.chunk_size.max(1)).max(1)
    }
}

/// Abstraction over the indexing service used by the HTTP surface.
#[async_trait]
pub trait IndexingApi: Send + Sync {
    /// Validate and stage uploads, then start a background run.
    async fn submit(&self, files: Vec<UploadedFile>) -> Result<TaskHandle, SubmitError>;

    /// Current progress of a run.
    fn progress(&self, task_id: &str) -> Result<TaskProgress, ProgressError>;

    /// Nearest records to a vector, or to the embedding of a text.
    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, QueryError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Drives indexing runs end to end and answers progress and query requests.
///
/// All state is behind `Arc`s, so clones share the same registry, clients, and metrics. Each run
/// executes on a spawned task holding its own clone and therefore outlives the request that
/// started it.
#[derive(Clone)]
pub struct IndexingService {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    progress: Arc<ProgressRegistry>,
    metrics: Arc<IndexingMetrics>,
    settings: Arc<IndexingSettings>,
    token_counter: TokenCounter,
}

impl IndexingService {
    /// Assemble a service from explicit components.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        progress: Arc<ProgressRegistry>,
        settings: IndexingSettings,
    ) -> Self {
        let token_counter = build_token_counter(&settings.tokenizer_model);
        Self {
            embedder,
            store,
            progress,
            metrics: Arc::new(IndexingMetrics::new()),
            settings: Arc::new(settings),
            token_counter,
        }
    }

    /// Build the embedding client, vector store, and registry selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self, IndexingError> {
        let embedder = build_embedding_client(config)?;
        let store = build_vector_store(config)?;
        let progress = Arc::new(ProgressRegistry::new(
            Duration::from_secs(config.progress_ttl_secs),
            config.progress_max_tasks,
        ));
        Ok(Self::new(
            embedder,
            store,
            progress,
            IndexingSettings::from_config(config),
        ))
    }

    /// Replace the token counter used for batch planning.
    pub fn with_token_counter(mut self, counter: TokenCounter) -> Self {
        self.token_counter = counter;
        self
    }

    /// Registry shared with polling handlers.
    pub fn progress_registry(&self) -> &Arc<ProgressRegistry> {
        &self.progress
    }

    /// Active settings.
    pub fn settings(&self) -> &IndexingSettings {
        &self.settings
    }

    /// Validate uploads, stage them under a fresh task directory, and start indexing.
    ///
    /// Validation happens before a task id exists: a rejected request persists nothing.
    pub async fn submit(&self, files: Vec<UploadedFile>) -> Result<TaskHandle, SubmitError> {
        let uploads = validate_uploads(files)?;
        let task_id = TaskId::generate();
        let count = uploads.len();
        let paths = persist_uploads(&self.settings.upload_dir, &task_id, uploads).await?;

        self.progress.create(task_id.as_str());
        self.metrics.record_task_started();
        let cleanup = task_upload_dir(&self.settings.upload_dir, &task_id);
        // The run is detached; progress is observable through the registry.
        let _handle = self.spawn_run(task_id.clone(), paths, Some(cleanup));

        tracing::info!(task_id = %task_id, files = count, "Indexing task accepted");
        Ok(TaskHandle {
            task_id,
            message: format!("Accepted {count} file(s); indexing started"),
        })
    }

    /// Start indexing files already on disk. The returned handle resolves when the run ends.
    pub fn index_paths(
        &self,
        paths: Vec<PathBuf>,
    ) -> Result<(TaskHandle, JoinHandle<()>), ValidationError> {
        if paths.is_empty() {
            return Err(ValidationError::EmptyFileSet);
        }
        if let Some(path) = paths.iter().find(|p| DocumentKind::from_path(p).is_none()) {
            return Err(ValidationError::UnsupportedType {
                filename: path.display().to_string(),
            });
        }

        let task_id = TaskId::generate();
        let count = paths.len();
        self.progress.create(task_id.as_str());
        self.metrics.record_task_started();
        let handle = self.spawn_run(task_id.clone(), paths, None);

        tracing::info!(task_id = %task_id, files = count, "Indexing task started");
        Ok((
            TaskHandle {
                task_id,
                message: format!("Indexing {count} file(s)"),
            },
            handle,
        ))
    }

    fn spawn_run(
        &self,
        task_id: TaskId,
        paths: Vec<PathBuf>,
        cleanup_dir: Option<PathBuf>,
    ) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            match service.run(&task_id, &paths).await {
                Ok(summary) => {
                    service
                        .metrics
                        .record_task_completed(summary.documents as u64, summary.chunks as u64);
                    tracing::info!(
                        task_id = %task_id,
                        documents = summary.documents,
                        chunks = summary.chunks,
                        batches = summary.batches,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Indexing task complete"
                    );
                }
                Err(error) => {
                    service.metrics.record_task_failed();
                    tracing::error!(
                        task_id = %task_id,
                        error = %error,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Indexing task failed"
                    );
                }
            }
            if let Some(dir) = cleanup_dir {
                remove_task_dir(&dir).await;
            }
        })
    }

    /// Run the pipeline for `task_id` over `paths`, publishing progress as batches commit.
    ///
    /// The task must already be registered. Any error leaves the task on the failure sentinel;
    /// batches committed before the failure stay in the index.
    pub async fn run(&self, task_id: &TaskId, paths: &[PathBuf]) -> Result<RunSummary, IndexingError> {
        let result = self.run_stages(task_id, paths).await;
        if result.is_err() {
            self.mark_failed(task_id);
        }
        result
    }

    async fn run_stages(
        &self,
        task_id: &TaskId,
        paths: &[PathBuf],
    ) -> Result<RunSummary, IndexingError> {
        let started = Instant::now();
        let chunks = self.extract_and_chunk(paths).await?;
        let total = chunks.len();
        tracing::info!(
            task_id = %task_id,
            documents = paths.len(),
            chunks = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Documents extracted and chunked"
        );
        if let Err(err) = self.progress.set_total_chunks(task_id.as_str(), total) {
            tracing::warn!(task_id = %task_id, error = %err, "Unable to record chunk total");
        }
        self.publish(task_id, PROGRESS_STARTED);

        self.store.recreate(&self.settings.index).await?;
        tracing::info!(index = %self.settings.index.name, "Index recreated");

        if total == 0 {
            tracing::warn!(task_id = %task_id, "No text to index; finishing with an empty index");
            self.publish(task_id, PROGRESS_COMPLETE);
            return Ok(RunSummary {
                documents: paths.len(),
                chunks: 0,
                batches: 0,
            });
        }

        let counter = self.token_counter.clone();
        let max_chunks = self.settings.batch_size();
        let ceiling = self.settings.max_input_tokens;
        let batches =
            tokio::task::spawn_blocking(move || plan_batches(chunks, max_chunks, ceiling, &counter))
                .await
                .map_err(|err| IndexingError::Worker(err.to_string()))?;
        let batch_count = batches.len();
        tracing::debug!(task_id = %task_id, batches = batch_count, max_chunks, "Batches planned");

        self.dispatch(task_id, batches, total).await?;
        self.publish(task_id, PROGRESS_COMPLETE);

        Ok(RunSummary {
            documents: paths.len(),
            chunks: total,
            batches: batch_count,
        })
    }

    async fn extract_and_chunk(&self, paths: &[PathBuf]) -> Result<Vec<Chunk>, IndexingError> {
        let mut chunks = Vec::new();
        for path in paths {
            let document = extract_document(path)
                .await
                .map_err(|source| IndexingError::Extraction {
                    path: path.clone(),
                    source,
                })?;
            let produced = chunk_document(
                &document,
                self.settings.chunk_size,
                self.settings.chunk_overlap,
            )?;
            tracing::debug!(file = %document.filename, chunks = produced.len(), "Document chunked");
            chunks.extend(produced);
        }
        Ok(chunks)
    }

    /// Feed `batches` to a fixed pool of workers; the first failure stops further dispatch.
    async fn dispatch(
        &self,
        task_id: &TaskId,
        batches: Vec<Batch>,
        total: usize,
    ) -> Result<(), IndexingError> {
        let workers = self.settings.workers.clamp(1, batches.len().max(1));
        let queue = Arc::new(Mutex::new(VecDeque::from(batches)));
        let failed = Arc::new(AtomicBool::new(false));
        let tracker = Arc::new(ProgressTracker::new(
            task_id.clone(),
            total,
            Arc::clone(&self.progress),
        ));

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let service = self.clone();
            let queue = Arc::clone(&queue);
            let failed = Arc::clone(&failed);
            let tracker = Arc::clone(&tracker);
            set.spawn(async move {
                while let Some(batch) = next_batch(&queue, &failed) {
                    let offset = batch.offset;
                    let size = batch.len();
                    if let Err(error) = service.process_batch(batch).await {
                        failed.store(true, Ordering::Release);
                        tracker.fail();
                        tracing::warn!(worker, offset, size, error = %error, "Batch failed");
                        return Err(error);
                    }
                    let progress = tracker.record(size);
                    tracing::debug!(worker, offset, size, progress, "Batch committed");
                }
                Ok::<(), IndexingError>(())
            });
        }

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            let outcome = joined.unwrap_or_else(|err| {
                failed.store(true, Ordering::Release);
                tracker.fail();
                Err(IndexingError::Worker(err.to_string()))
            });
            if let Err(error) = outcome {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Embed one batch and upsert it; ids are the batch offset plus the position in the batch.
    async fn process_batch(&self, batch: Batch) -> Result<usize, IndexingError> {
        let Batch { offset, chunks } = batch;
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.generate_embeddings(texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(EmbeddingClientError::CountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            }
            .into());
        }

        let indexed_at = current_timestamp_rfc3339();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .zip(offset..)
            .map(|((chunk, vector), id)| VectorRecord {
                id,
                vector,
                metadata: RecordMetadata {
                    chunk_hash: compute_chunk_hash(&chunk.text),
                    text: chunk.text,
                    source: chunk.source,
                    chunk_index: chunk.position,
                    indexed_at: indexed_at.clone(),
                },
            })
            .collect();

        let written = self
            .store
            .upsert(&self.settings.index.name, records)
            .await?;
        Ok(written)
    }

    fn publish(&self, task_id: &TaskId, value: i32) {
        if let Err(err) = self.progress.set(task_id.as_str(), value) {
            tracing::warn!(task_id = %task_id, error = %err, "Progress update dropped");
        }
    }

    fn mark_failed(&self, task_id: &TaskId) {
        if let Err(err) = self.progress.fail(task_id.as_str()) {
            tracing::warn!(task_id = %task_id, error = %err, "Failure status dropped");
        }
    }

    /// Current progress of `task_id`.
    pub fn progress(&self, task_id: &str) -> Result<TaskProgress, ProgressError> {
        self.progress.get(task_id)
    }

    /// Nearest records to `request.vector`, or to the embedding of `request.text`.
    pub async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, QueryError> {
        let QueryRequest {
            vector,
            text,
            top_k,
        } = request;

        let vector = match (vector, text) {
            (Some(vector), _) => vector,
            (None, Some(text)) if !text.trim().is_empty() => self
                .embedder
                .generate_embeddings(vec![text])
                .await?
                .pop()
                .ok_or(EmbeddingClientError::CountMismatch {
                    expected: 1,
                    actual: 0,
                })?,
            _ => return Err(QueryError::MissingInput),
        };

        let expected = self.settings.index.dimension;
        if vector.len() != expected {
            return Err(QueryError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let top_k = top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);
        let matches = self
            .store
            .query(&self.settings.index.name, vector, top_k)
            .await?;
        tracing::debug!(index = %self.settings.index.name, top_k, hits = matches.len(), "Query served");
        Ok(matches)
    }

    /// Return the current indexing metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Root directory for staged uploads.
    pub fn upload_dir(&self) -> &Path {
        &self.settings.upload_dir
    }
}

#[async_trait]
impl IndexingApi for IndexingService {
    async fn submit(&self, files: Vec<UploadedFile>) -> Result<TaskHandle, SubmitError> {
        IndexingService::submit(self, files).await
    }

    fn progress(&self, task_id: &str) -> Result<TaskProgress, ProgressError> {
        IndexingService::progress(self, task_id)
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, QueryError> {
        IndexingService::query(self, request).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        IndexingService::metrics_snapshot(self)
    }
}

fn next_batch(queue: &Mutex<VecDeque<Batch>>, failed: &AtomicBool) -> Option<Batch> {
    if failed.load(Ordering::Acquire) {
        return None;
    }
    queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .pop_front()
}

/// Shared processed-chunk counter; every update and its progress write happen under one lock.
struct ProgressTracker {
    task_id: TaskId,
    total: usize,
    processed: Mutex<usize>,
    registry: Arc<ProgressRegistry>,
}

impl ProgressTracker {
    fn new(task_id: TaskId, total: usize, registry: Arc<ProgressRegistry>) -> Self {
        Self {
            task_id,
            total,
            processed: Mutex::new(0),
            registry,
        }
    }

    fn record(&self, chunks: usize) -> i32 {
        let mut processed = self
            .processed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *processed = (*processed + chunks).min(self.total);
        let value = banded_progress(*processed, self.total);
        if let Err(err) = self.registry.set(self.task_id.as_str(), value) {
            tracing::warn!(task_id = %self.task_id, error = %err, "Progress update dropped");
        }
        value
    }

    fn fail(&self) {
        let _processed = self
            .processed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = self.registry.fail(self.task_id.as_str()) {
            tracing::warn!(task_id = %self.task_id, error = %err, "Failure status dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::processing::batching::whitespace_token_counter;
    use crate::processing::progress::{PROGRESS_FAILED, TaskStatus};
    use crate::store::{DistanceMetric, MemoryStore, StoreError};

    const INDEX: &str = "unit-index";

    fn settings(upload_dir: &Path, chunk_size: usize, overlap: usize) -> IndexingSettings {
        IndexingSettings {
            index: IndexSpec {
                name: INDEX.into(),
                dimension: 8,
                metric: DistanceMetric::Cosine,
            },
            chunk_size,
            chunk_overlap: overlap,
            max_input_tokens: chunk_size * 2,
            workers: 2,
            upload_dir: upload_dir.to_path_buf(),
            tokenizer_model: "cl100k_base".into(),
        }
    }

    fn service(store: Arc<MemoryStore>, settings: IndexingSettings) -> IndexingService {
        IndexingService::new(
            Arc::new(HashEmbeddingClient::new(8)),
            store,
            Arc::new(ProgressRegistry::default()),
            settings,
        )
        .with_token_counter(whitespace_token_counter())
    }

    fn docx(paragraphs: &[&str]) -> Vec<u8> {
        crate::processing::extract::tests::docx_bytes(paragraphs)
    }

    #[test]
    fn batch_size_derives_from_token_ceiling() {
        let dir = Path::new("uploads");
        let mut settings = settings(dir, 1000, 100);
        settings.max_input_tokens = 300_000;
        assert_eq!(settings.batch_size(), 300);
        settings.max_input_tokens = 10;
        assert_eq!(settings.batch_size(), 1);
    }

    #[tokio::test]
    async fn run_indexes_every_chunk_with_sequential_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.docx");
        std::fs::write(&path, docx(&[&"w".repeat(250)])).expect("write");

        let store = Arc::new(MemoryStore::new());
        let service = service(Arc::clone(&store), settings(dir.path(), 100, 10));
        let task_id = TaskId::generate();
        service.progress_registry().create(task_id.as_str());

        let summary = service.run(&task_id, &[path]).await.expect("run");
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.chunks, 3);
        assert_eq!(store.record_ids(INDEX), vec![0, 1, 2]);

        let progress = service.progress(task_id.as_str()).expect("progress");
        assert_eq!(progress.progress, PROGRESS_COMPLETE);
        assert_eq!(progress.total_chunks, Some(3));
    }

    #[tokio::test]
    async fn extraction_failure_fails_the_task() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").expect("write");

        let store = Arc::new(MemoryStore::new());
        let service = service(Arc::clone(&store), settings(dir.path(), 100, 10));
        let (handle, join) = service.index_paths(vec![path]).expect("accepted");
        join.await.expect("join");

        let progress = service.progress(handle.task_id.as_str()).expect("progress");
        assert_eq!(progress.progress, PROGRESS_FAILED);
        assert_eq!(progress.status, TaskStatus::Failed);
        assert_eq!(store.record_count(INDEX), None);
        assert_eq!(service.metrics_snapshot().tasks_failed, 1);
    }

    #[tokio::test]
    async fn direct_run_sets_sentinel_when_extraction_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").expect("write");

        let service = service(Arc::new(MemoryStore::new()), settings(dir.path(), 100, 10));
        let task_id = TaskId::generate();
        service.progress_registry().create(task_id.as_str());

        let result = service.run(&task_id, &[path]).await;
        assert!(matches!(result, Err(IndexingError::Extraction { .. })));
        let progress = service.progress(task_id.as_str()).expect("progress");
        assert_eq!(progress.progress, PROGRESS_FAILED);
        assert_eq!(progress.status, TaskStatus::Failed);
    }

    struct RefusingStore;

    #[async_trait]
    impl VectorStore for RefusingStore {
        async fn recreate(&self, spec: &IndexSpec) -> Result<(), StoreError> {
            Err(StoreError::IndexNotFound(spec.name.clone()))
        }

        async fn upsert(&self, _: &str, _: Vec<VectorRecord>) -> Result<usize, StoreError> {
            unreachable!("upsert after failed recreate")
        }

        async fn query(&self, _: &str, _: Vec<f32>, _: usize) -> Result<Vec<QueryMatch>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn direct_run_sets_sentinel_when_recreate_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.docx");
        std::fs::write(&path, docx(&["some text"])).expect("write");

        let service = IndexingService::new(
            Arc::new(HashEmbeddingClient::new(8)),
            Arc::new(RefusingStore),
            Arc::new(ProgressRegistry::default()),
            settings(dir.path(), 100, 10),
        )
        .with_token_counter(whitespace_token_counter());
        let task_id = TaskId::generate();
        service.progress_registry().create(task_id.as_str());

        let result = service.run(&task_id, &[path]).await;
        assert!(matches!(result, Err(IndexingError::Store(_))));
        let progress = service.progress(task_id.as_str()).expect("progress");
        assert_eq!(progress.progress, PROGRESS_FAILED);
        assert_eq!(progress.total_chunks, Some(1));
    }

    #[tokio::test]
    async fn empty_documents_complete_with_empty_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blank.docx");
        std::fs::write(&path, docx(&["   "])).expect("write");

        let store = Arc::new(MemoryStore::new());
        let service = service(Arc::clone(&store), settings(dir.path(), 100, 10));
        let (handle, join) = service.index_paths(vec![path]).expect("accepted");
        join.await.expect("join");

        let progress = service.progress(handle.task_id.as_str()).expect("progress");
        assert_eq!(progress.progress, PROGRESS_COMPLETE);
        assert_eq!(progress.total_chunks, Some(0));
        assert_eq!(store.record_count(INDEX), Some(0));
    }

    #[test]
    fn index_paths_rejects_unsupported_files() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store, settings(Path::new("uploads"), 100, 10));
        assert_eq!(
            service.index_paths(Vec::new()).unwrap_err(),
            ValidationError::EmptyFileSet
        );
        assert!(matches!(
            service.index_paths(vec![PathBuf::from("notes.txt")]),
            Err(ValidationError::UnsupportedType { .. })
        ));
        assert!(service.progress_registry().is_empty());
    }

    #[tokio::test]
    async fn query_by_text_returns_stored_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("facts.docx");
        std::fs::write(&path, docx(&["Rust has ownership.", "Tokio runs tasks."])).expect("write");

        let store = Arc::new(MemoryStore::new());
        let service = service(Arc::clone(&store), settings(dir.path(), 1000, 100));
        let (_, join) = service.index_paths(vec![path]).expect("accepted");
        join.await.expect("join");

        let matches = service
            .query(QueryRequest {
                vector: None,
                text: Some("Rust has ownership.".into()),
                top_k: Some(3),
            })
            .await
            .expect("query");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source(), Some("facts.docx"));
        assert_eq!(matches[0].chunk_index(), Some(0));
        assert!(matches[0].text().is_some_and(|text| text.contains("Tokio")));
    }

    #[tokio::test]
    async fn query_validates_input() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store, settings(Path::new("uploads"), 100, 10));

        let missing = service.query(QueryRequest::default()).await.unwrap_err();
        assert!(matches!(missing, QueryError::MissingInput));

        let wrong = service
            .query(QueryRequest {
                vector: Some(vec![1.0; 3]),
                text: None,
                top_k: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            wrong,
            QueryError::DimensionMismatch {
                expected: 8,
                actual: 3
            }
        ));
    }
}
