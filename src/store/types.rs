//! Shared types used by the vector store backends.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors returned while interacting with a vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The store responded with an unexpected status code.
    #[error("Unexpected store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The named index does not exist.
    #[error("Index '{0}' does not exist")]
    IndexNotFound(String),
    /// A record's vector does not match the index dimensionality.
    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the index was created with.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },
    /// The index did not reach the expected state within the polling budget.
    #[error("Index '{index}' not ready after {attempts} attempts")]
    NotReady {
        /// Index that was being polled.
        index: String,
        /// Number of polls performed before giving up.
        attempts: u32,
    },
    /// Required credentials were not configured.
    #[error("Missing credentials: {0}")]
    MissingCredentials(&'static str),
    /// The store returned a body we could not interpret.
    #[error("Malformed store response: {0}")]
    Malformed(String),
}

/// Similarity metric used by an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Raw dot product.
    DotProduct,
    /// Euclidean distance.
    Euclidean,
}

impl DistanceMetric {
    /// Name used by Qdrant's collection API.
    pub fn as_qdrant(self) -> &'static str {
        match self {
            Self::Cosine => "Cosine",
            Self::DotProduct => "Dot",
            Self::Euclidean => "Euclid",
        }
    }

    /// Name used by Pinecone's control plane.
    pub fn as_pinecone(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dotproduct",
            Self::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_pinecone())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" | "dotproduct" | "dot_product" => Ok(Self::DotProduct),
            "euclid" | "euclidean" => Ok(Self::Euclidean),
            _ => Err(()),
        }
    }
}

/// Shape of the index created at the start of every indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index (collection) name.
    pub name: String,
    /// Vector dimensionality.
    pub dimension: usize,
    /// Similarity metric.
    pub metric: DistanceMetric,
}

/// Metadata persisted next to every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Chunk text, used downstream for context assembly.
    pub text: String,
    /// Filename of the originating document.
    pub source: String,
    /// Ordinal of the chunk within its document.
    pub chunk_index: usize,
    /// SHA-256 of the chunk text.
    pub chunk_hash: String,
    /// RFC 3339 timestamp of the indexing run.
    pub indexed_at: String,
}

/// A vector ready for upsert. Ids come from the run's ingestion offset.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Ingestion offset of the chunk within the run.
    pub id: u64,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Payload stored with the vector.
    pub metadata: RecordMetadata,
}

/// Nearest-neighbour hit returned by [`crate::store::VectorStore::query`].
#[derive(Debug, Clone)]
pub struct QueryMatch {
    /// Record identifier as reported by the backend.
    pub id: String,
    /// Similarity score reported by the backend.
    pub score: f32,
    /// Stored payload, if the backend returned one.
    pub payload: Option<Map<String, Value>>,
}

impl QueryMatch {
    /// Stored chunk text.
    pub fn text(&self) -> Option<&str> {
        self.payload_str("text")
    }

    /// Originating filename.
    pub fn source(&self) -> Option<&str> {
        self.payload_str("source")
    }

    /// Chunk ordinal within the originating document.
    pub fn chunk_index(&self) -> Option<u64> {
        self.payload
            .as_ref()
            .and_then(|payload| payload.get("chunk_index"))
            .and_then(Value::as_u64)
    }

    fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|payload| payload.get(key))
            .and_then(Value::as_str)
    }
}

#[derive(Deserialize)]
pub(crate) struct QdrantQueryResponse {
    pub(crate) result: QdrantQueryResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QdrantQueryResult {
    Points(Vec<QdrantPoint>),
    Object {
        #[serde(default)]
        points: Vec<QdrantPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QdrantPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct PineconeIndexDescription {
    #[serde(default)]
    pub(crate) host: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<PineconeIndexStatus>,
}

#[derive(Deserialize)]
pub(crate) struct PineconeIndexStatus {
    #[serde(default)]
    pub(crate) ready: bool,
}

#[derive(Deserialize)]
pub(crate) struct PineconeQueryResponse {
    #[serde(default)]
    pub(crate) matches: Vec<PineconeMatch>,
}

#[derive(Deserialize)]
pub(crate) struct PineconeMatch {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) metadata: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metric_parses_common_spellings() {
        assert_eq!("Cosine".parse(), Ok(DistanceMetric::Cosine));
        assert_eq!("dot".parse(), Ok(DistanceMetric::DotProduct));
        assert_eq!("euclidean".parse(), Ok(DistanceMetric::Euclidean));
        assert_eq!("manhattan".parse::<DistanceMetric>(), Err(()));
    }

    #[test]
    fn query_match_reads_payload_fields() {
        let hit = QueryMatch {
            id: "7".into(),
            score: 0.9,
            payload: json!({ "text": "hello", "source": "a.pdf", "chunk_index": 3 })
                .as_object()
                .cloned(),
        };
        assert_eq!(hit.text(), Some("hello"));
        assert_eq!(hit.source(), Some("a.pdf"));
        assert_eq!(hit.chunk_index(), Some(3));
    }
}
