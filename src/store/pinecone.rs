//! Pinecone serverless backend.
//!
//! Index lifecycle goes through the control plane (`/indexes`); vectors go to the per-index
//! data-plane host reported by `describe`. Creation and deletion are asynchronous on
//! Pinecone's side, so `recreate` polls until the old index is gone and the new one reports
//! `ready`.

use crate::store::{
    VectorStore,
    payload::{build_payload, record_key},
    qdrant::format_endpoint,
    types::{
        IndexSpec, PineconeIndexDescription, PineconeQueryResponse, QueryMatch, StoreError,
        VectorRecord,
    },
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

const API_VERSION: &str = "2024-07";
/// Pinecone caps upsert requests at 2 MB; 100 vectors of 1536 floats stays well under it.
const UPSERT_CHUNK: usize = 100;

/// Where and how often to poll while an index changes state.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Delay between consecutive polls.
    pub interval: Duration,
    /// Maximum number of polls before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 120,
        }
    }
}

/// Serverless deployment target for newly created indexes.
#[derive(Debug, Clone)]
pub struct ServerlessTarget {
    /// Cloud provider identifier, e.g. `aws`.
    pub cloud: String,
    /// Region identifier, e.g. `us-east-1`.
    pub region: String,
}

/// Pinecone client covering control-plane and data-plane calls.
pub struct PineconeStore {
    client: Client,
    controller_url: String,
    api_key: String,
    target: ServerlessTarget,
    poll: PollPolicy,
    hosts: RwLock<HashMap<String, String>>,
}

impl PineconeStore {
    /// Build a Pinecone client.
    pub fn new(
        controller_url: &str,
        api_key: Option<String>,
        target: ServerlessTarget,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(StoreError::MissingCredentials("PINECONE_API_KEY"))?;
        reqwest::Url::parse(controller_url)
            .map_err(|err| StoreError::InvalidUrl(err.to_string()))?;
        let client = Client::builder()
            .user_agent("rustyrag/0.1")
            .timeout(timeout)
            .build()?;

        tracing::debug!(
            controller = controller_url,
            cloud = %target.cloud,
            region = %target.region,
            "Initialized Pinecone HTTP client"
        );

        Ok(Self {
            client,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            api_key,
            target,
            poll: PollPolicy::default(),
            hosts: RwLock::new(HashMap::new()),
        })
    }

    /// Override the readiness polling policy.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn control(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.request(method, format_endpoint(&self.controller_url, path))
    }

    async fn describe(&self, index: &str) -> Result<Option<PineconeIndexDescription>, StoreError> {
        let response = self
            .control(Method::GET, &format!("indexes/{index}"))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(unexpected(status, response).await),
        }
    }

    async fn delete_index(&self, index: &str) -> Result<bool, StoreError> {
        let response = self
            .control(Method::DELETE, &format!("indexes/{index}"))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(unexpected(status, response).await),
        }
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        let body = json!({
            "name": spec.name,
            "dimension": spec.dimension,
            "metric": spec.metric.as_pinecone(),
            "spec": {
                "serverless": {
                    "cloud": self.target.cloud,
                    "region": self.target.region,
                }
            }
        });
        let response = self.control(Method::POST, "indexes").json(&body).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            Err(unexpected(status, response).await)
        }
    }

    async fn wait_until_deleted(&self, index: &str) -> Result<(), StoreError> {
        for attempt in 1..=self.poll.max_attempts {
            if self.describe(index).await?.is_none() {
                tracing::debug!(index, attempt, "Pinecone index deleted");
                return Ok(());
            }
            tokio::time::sleep(self.poll.interval).await;
        }
        Err(StoreError::NotReady {
            index: index.to_string(),
            attempts: self.poll.max_attempts,
        })
    }

    async fn wait_until_ready(&self, index: &str) -> Result<String, StoreError> {
        for attempt in 1..=self.poll.max_attempts {
            if let Some(description) = self.describe(index).await?
                && description.status.as_ref().is_some_and(|status| status.ready)
                && let Some(host) = description.host
            {
                tracing::debug!(index, attempt, host = %host, "Pinecone index ready");
                return Ok(host);
            }
            tokio::time::sleep(self.poll.interval).await;
        }
        Err(StoreError::NotReady {
            index: index.to_string(),
            attempts: self.poll.max_attempts,
        })
    }

    async fn data_host(&self, index: &str) -> Result<String, StoreError> {
        if let Some(host) = self.hosts.read().await.get(index) {
            return Ok(host.clone());
        }
        let host = self
            .describe(index)
            .await?
            .and_then(|description| description.host)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        let host = with_scheme(&host);
        self.hosts
            .write()
            .await
            .insert(index.to_string(), host.clone());
        Ok(host)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn recreate(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        self.hosts.write().await.remove(&spec.name);
        if self.delete_index(&spec.name).await? {
            tracing::info!(index = %spec.name, "Deleted previous Pinecone index");
            self.wait_until_deleted(&spec.name).await?;
        }
        self.create_index(spec).await?;
        let host = self.wait_until_ready(&spec.name).await?;
        self.hosts
            .write()
            .await
            .insert(spec.name.clone(), with_scheme(&host));
        tracing::info!(
            index = %spec.name,
            dimension = spec.dimension,
            metric = %spec.metric,
            "Pinecone index created"
        );
        Ok(())
    }

    async fn upsert(&self, index: &str, records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let host = self.data_host(index).await?;
        let mut upserted = 0;
        for slice in records.chunks(UPSERT_CHUNK) {
            let vectors: Vec<Value> = slice
                .iter()
                .map(|record| {
                    json!({
                        "id": record_key(record.id),
                        "values": record.vector,
                        "metadata": build_payload(&record.metadata),
                    })
                })
                .collect();
            let response = self
                .request(Method::POST, format_endpoint(&host, "vectors/upsert"))
                .json(&json!({ "vectors": vectors }))
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let error = unexpected(status, response).await;
                tracing::error!(index, error = %error, "Pinecone upsert failed");
                return Err(error);
            }
            upserted += slice.len();
        }
        tracing::debug!(index, vectors = upserted, "Vectors upserted");
        Ok(upserted)
    }

    async fn query(
        &self,
        index: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let host = self.data_host(index).await?;
        let response = self
            .request(Method::POST, format_endpoint(&host, "query"))
            .json(&json!({
                "vector": vector,
                "topK": top_k,
                "includeMetadata": true,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(unexpected(status, response).await);
        }
        let body: PineconeQueryResponse = response.json().await?;
        Ok(body
            .matches
            .into_iter()
            .map(|hit| QueryMatch {
                id: hit.id,
                score: hit.score,
                payload: hit.metadata,
            })
            .collect())
    }
}

fn with_scheme(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

async fn unexpected(status: StatusCode, response: reqwest::Response) -> StoreError {
    let body = response.text().await.unwrap_or_default();
    StoreError::UnexpectedStatus { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{DistanceMetric, RecordMetadata};
    use httpmock::{
        Method::{DELETE, GET, POST},
        MockServer,
    };

    fn store_for(server: &MockServer) -> PineconeStore {
        PineconeStore::new(
            &server.base_url(),
            Some("secret".into()),
            ServerlessTarget {
                cloud: "aws".into(),
                region: "us-east-1".into(),
            },
            Duration::from_secs(5),
        )
        .expect("client")
        .with_poll_policy(PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        })
    }

    fn record(id: u64) -> VectorRecord {
        VectorRecord {
            id,
            vector: vec![0.5; 3],
            metadata: RecordMetadata {
                text: "t".into(),
                source: "a.docx".into(),
                chunk_index: 0,
                chunk_hash: "h".into(),
                indexed_at: "2025-01-01T00:00:00Z".into(),
            },
        }
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let result = PineconeStore::new(
            "https://api.pinecone.io",
            None,
            ServerlessTarget {
                cloud: "aws".into(),
                region: "us-east-1".into(),
            },
            Duration::from_secs(1),
        );
        assert!(matches!(
            result,
            Err(StoreError::MissingCredentials("PINECONE_API_KEY"))
        ));
    }

    #[tokio::test]
    async fn recreate_creates_serverless_index_and_waits_for_ready() {
        let server = MockServer::start_async().await;
        let host = server.base_url();
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/indexes/rag");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes")
                    .header("Api-Key", "secret")
                    .json_body(json!({
                        "name": "rag",
                        "dimension": 3,
                        "metric": "cosine",
                        "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
                    }));
                then.status(201).json_body(json!({ "name": "rag" }));
            })
            .await;
        let describe = server
            .mock_async(move |when, then| {
                when.method(GET).path("/indexes/rag");
                then.status(200).json_body(json!({
                    "name": "rag",
                    "host": host,
                    "status": { "ready": true, "state": "Ready" }
                }));
            })
            .await;

        let store = store_for(&server);
        store
            .recreate(&IndexSpec {
                name: "rag".into(),
                dimension: 3,
                metric: DistanceMetric::Cosine,
            })
            .await
            .expect("recreate");

        delete.assert_async().await;
        create.assert_async().await;
        assert_eq!(describe.hits_async().await, 1);
    }

    #[tokio::test]
    async fn recreate_gives_up_when_index_never_ready() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/indexes/rag");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes");
                then.status(201);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/indexes/rag");
                then.status(200)
                    .json_body(json!({ "name": "rag", "status": { "ready": false } }));
            })
            .await;

        let error = store_for(&server)
            .recreate(&IndexSpec {
                name: "rag".into(),
                dimension: 3,
                metric: DistanceMetric::Cosine,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::NotReady { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn upsert_uses_string_ids_on_data_plane() {
        let server = MockServer::start_async().await;
        let host = server.base_url();
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/indexes/rag");
                then.status(200)
                    .json_body(json!({ "host": host, "status": { "ready": true } }));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/vectors/upsert")
                    .body_contains("\"id\":\"doc-7\"");
                then.status(200).json_body(json!({ "upsertedCount": 1 }));
            })
            .await;

        let count = store_for(&server)
            .upsert("rag", vec![record(7)])
            .await
            .expect("upsert");
        upsert.assert_async().await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn query_returns_matches_with_metadata() {
        let server = MockServer::start_async().await;
        let host = server.base_url();
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/indexes/rag");
                then.status(200)
                    .json_body(json!({ "host": host, "status": { "ready": true } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query").json_body_partial(r#"{ "topK": 2 }"#);
                then.status(200).json_body(json!({
                    "matches": [
                        { "id": "doc-1", "score": 0.8, "metadata": { "text": "alpha", "source": "a.pdf" } }
                    ]
                }));
            })
            .await;

        let hits = store_for(&server)
            .query("rag", vec![0.1, 0.2, 0.3], 2)
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "doc-1");
        assert_eq!(hits[0].text(), Some("alpha"));
    }

    #[test]
    fn bare_hosts_get_https_scheme() {
        assert_eq!(with_scheme("idx.svc.pinecone.io"), "https://idx.svc.pinecone.io");
        assert_eq!(with_scheme("http://127.0.0.1:1"), "http://127.0.0.1:1");
    }
}
