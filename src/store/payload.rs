//! Helpers for constructing and hashing record payloads.

use crate::store::types::RecordMetadata;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Serialize record metadata into the JSON object stored alongside each vector.
pub(crate) fn build_payload(metadata: &RecordMetadata) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(metadata.text.clone()));
    payload.insert("source".into(), Value::String(metadata.source.clone()));
    payload.insert("chunk_index".into(), Value::from(metadata.chunk_index));
    payload.insert(
        "chunk_hash".into(),
        Value::String(metadata.chunk_hash.clone()),
    );
    payload.insert(
        "indexed_at".into(),
        Value::String(metadata.indexed_at.clone()),
    );
    payload
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// String key used by backends that require textual ids.
pub(crate) fn record_key(id: u64) -> String {
    format!("doc-{id}")
}
