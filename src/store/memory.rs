//! In-process vector store.
//!
//! Brute-force nearest-neighbour search over every stored vector. Suitable for tests and
//! small offline runs; contents vanish with the process.

use crate::store::{
    VectorStore,
    payload::build_payload,
    types::{DistanceMetric, IndexSpec, QueryMatch, StoreError, VectorRecord},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

struct MemoryIndex {
    dimension: usize,
    metric: DistanceMetric,
    records: BTreeMap<u64, VectorRecord>,
}

/// Vector store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemoryStore {
    /// Create an empty store with no indexes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held by `index`, or `None` when the index does not exist.
    pub fn record_count(&self, index: &str) -> Option<usize> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|entry| entry.records.len())
    }

    /// Sorted ids currently stored in `index`.
    pub fn record_ids(&self, index: &str) -> Vec<u64> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|entry| entry.records.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn recreate(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        indexes.insert(
            spec.name.clone(),
            MemoryIndex {
                dimension: spec.dimension,
                metric: spec.metric,
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        let entry = indexes
            .get_mut(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        if let Some(bad) = records
            .iter()
            .find(|record| record.vector.len() != entry.dimension)
        {
            return Err(StoreError::DimensionMismatch {
                expected: entry.dimension,
                actual: bad.vector.len(),
            });
        }
        let count = records.len();
        for record in records {
            entry.records.insert(record.id, record);
        }
        Ok(count)
    }

    async fn query(
        &self,
        index: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        let entry = indexes
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        if vector.len() != entry.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: entry.dimension,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(f32, &VectorRecord)> = entry
            .records
            .values()
            .map(|record| (score(entry.metric, &vector, &record.vector), record))
            .collect();
        // Higher is better for every metric; euclidean scores are negated distances.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.id.cmp(&b.1.id)));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, record)| QueryMatch {
                id: record.id.to_string(),
                score,
                payload: Some(build_payload(&record.metadata)),
            })
            .collect())
    }
}

fn score(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        DistanceMetric::Euclidean => -a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::RecordMetadata;

    fn spec(dimension: usize) -> IndexSpec {
        IndexSpec {
            name: "docs".into(),
            dimension,
            metric: DistanceMetric::Cosine,
        }
    }

    fn record(id: u64, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id,
            vector,
            metadata: RecordMetadata {
                text: format!("chunk {id}"),
                source: "a.pdf".into(),
                chunk_index: id as usize,
                chunk_hash: String::new(),
                indexed_at: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn query_orders_by_similarity() {
        let store = MemoryStore::new();
        store.recreate(&spec(2)).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    record(0, vec![1.0, 0.0]),
                    record(1, vec![0.0, 1.0]),
                    record(2, vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("docs", vec![1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "0");
        assert_eq!(hits[1].id, "2");
        assert_eq!(hits[0].text(), Some("chunk 0"));
    }

    #[tokio::test]
    async fn recreate_discards_previous_records() {
        let store = MemoryStore::new();
        store.recreate(&spec(2)).await.unwrap();
        store
            .upsert("docs", vec![record(0, vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.record_count("docs"), Some(1));

        store.recreate(&spec(2)).await.unwrap();
        assert_eq!(store.record_count("docs"), Some(0));
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id_and_checks_dimension() {
        let store = MemoryStore::new();
        store.recreate(&spec(2)).await.unwrap();
        store
            .upsert("docs", vec![record(5, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert("docs", vec![record(5, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.record_ids("docs"), vec![5]);

        let error = store
            .upsert("docs", vec![record(6, vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            StoreError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn missing_index_is_reported() {
        let store = MemoryStore::new();
        let error = store.query("nope", vec![1.0], 1).await.unwrap_err();
        assert!(matches!(error, StoreError::IndexNotFound(name) if name == "nope"));
    }
}
