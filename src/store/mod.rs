//! Vector store abstraction and backends.

pub mod memory;
pub(crate) mod payload;
pub mod pinecone;
pub mod qdrant;
pub mod types;

use crate::config::{Config, VectorStoreKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use memory::MemoryStore;
pub use payload::{compute_chunk_hash, current_timestamp_rfc3339};
pub use pinecone::{PineconeStore, PollPolicy, ServerlessTarget};
pub use qdrant::QdrantStore;
pub use types::{DistanceMetric, IndexSpec, QueryMatch, RecordMetadata, StoreError, VectorRecord};

/// Operations the indexing pipeline needs from a vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Destroy any index named `spec.name` and create a fresh, empty one.
    async fn recreate(&self, spec: &IndexSpec) -> Result<(), StoreError>;

    /// Insert or overwrite `records` in `index`, returning how many were written.
    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<usize, StoreError>;

    /// Return the `top_k` records nearest to `vector`.
    async fn query(
        &self,
        index: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError>;
}

/// Build the vector store selected by `VECTOR_STORE`.
pub fn build_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>, StoreError> {
    let timeout = Duration::from_secs(config.store_timeout_secs);
    let store: Arc<dyn VectorStore> = match config.vector_store {
        VectorStoreKind::Qdrant => Arc::new(QdrantStore::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            timeout,
        )?),
        VectorStoreKind::Pinecone => Arc::new(PineconeStore::new(
            &config.pinecone_controller_url,
            config.pinecone_api_key.clone(),
            ServerlessTarget {
                cloud: config.index_cloud.clone(),
                region: config.index_region.clone(),
            },
            timeout,
        )?),
        VectorStoreKind::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::info!(backend = ?config.vector_store, "Vector store initialized");
    Ok(store)
}
