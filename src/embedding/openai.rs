//! OpenAI embeddings over HTTP.

use super::{EmbeddingClient, EmbeddingClientError, validate_embeddings};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for `POST {base_url}/embeddings`.
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Build a client; fails when no API key is configured.
    pub fn new(
        api_key: Option<String>,
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(EmbeddingClientError::MissingCredentials("OPENAI_API_KEY"))?;
        let client = Client::builder()
            .user_agent("rustyrag/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            dimension,
        })
    }

    // Only the text-embedding-3 family accepts a `dimensions` override.
    fn dimensions_param(&self) -> Option<usize> {
        self.model
            .starts_with("text-embedding-3")
            .then_some(self.dimension)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let body = EmbeddingsRequest {
            model: &self.model,
            input: &texts,
            dimensions: self.dimensions_param(),
        };
        tracing::debug!(model = %self.model, texts = texts.len(), "Requesting OpenAI embeddings");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "OpenAI embeddings request rejected");
            return Err(EmbeddingClientError::UnexpectedStatus { status, body });
        }

        let mut payload: EmbeddingsResponse = response.json().await?;
        payload.data.sort_by_key(|datum| datum.index);
        let embeddings = payload
            .data
            .into_iter()
            .map(|datum| datum.embedding)
            .collect();
        validate_embeddings(texts.len(), self.dimension, embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client_for(server: &MockServer, dimension: usize) -> OpenAiClient {
        OpenAiClient::new(
            Some("sk-test".into()),
            &server.url("/v1"),
            "text-embedding-3-small",
            dimension,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn embeddings_are_returned_in_input_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{ "model": "text-embedding-3-small", "dimensions": 2 }"#);
                then.status(200).json_body(json!({
                    "object": "list",
                    "data": [
                        { "object": "embedding", "index": 1, "embedding": [0.0, 1.0] },
                        { "object": "embedding", "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let vectors = client_for(&server, 2)
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn rate_limits_surface_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(429).body("slow down");
            })
            .await;

        let error = client_for(&server, 2)
            .generate_embeddings(vec!["text".into()])
            .await
            .unwrap_err();

        assert_eq!(mock.hits_async().await, 1);
        assert!(matches!(
            error,
            EmbeddingClientError::UnexpectedStatus { status, .. } if status.as_u16() == 429
        ));
    }

    #[tokio::test]
    async fn short_responses_are_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200).json_body(json!({
                    "data": [ { "index": 0, "embedding": [1.0, 0.0] } ]
                }));
            })
            .await;

        let error = client_for(&server, 2)
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::CountMismatch { .. }));
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let result = OpenAiClient::new(
            None,
            "https://api.openai.com/v1",
            "text-embedding-3-small",
            1536,
            Duration::from_secs(1),
        );
        assert!(matches!(
            result,
            Err(EmbeddingClientError::MissingCredentials("OPENAI_API_KEY"))
        ));
    }
}
