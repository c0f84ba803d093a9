use super::{EmbeddingClient, EmbeddingClientError, validate_embeddings};
use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest},
};
use reqwest::{Client, Url};
use std::time::Duration;

const DEFAULT_PORT: u16 = 11434;

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaClient {
    ollama: Ollama,
    model: String,
    dimension: usize,
}

impl OllamaClient {
    /// Connect to the Ollama runtime at `url`; every request is bounded by `timeout`.
    pub fn new(
        url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let parsed = Url::parse(url)
            .ok()
            .filter(|parsed| parsed.has_host())
            .ok_or_else(|| {
                EmbeddingClientError::GenerationFailed(format!("invalid Ollama URL '{url}'"))
            })?;
        let port = parsed.port_or_known_default().unwrap_or(DEFAULT_PORT);
        let client = Client::builder().timeout(timeout).build()?;
        let ollama = Ollama::new_with_client(parsed, port, client);
        tracing::debug!(url, model, timeout_ms = timeout.as_millis() as u64, "Initialized Ollama client");
        Ok(Self {
            ollama,
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let expected = texts.len();
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|err| EmbeddingClientError::GenerationFailed(err.to_string()))?;
        validate_embeddings(expected, self.dimension, response.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    #[test]
    fn invalid_url_is_reported() {
        let result = OllamaClient::new("not a url", "nomic-embed-text", 768, Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(EmbeddingClientError::GenerationFailed(message)) if message.contains("invalid Ollama URL")
        ));
    }

    #[tokio::test]
    async fn stalled_server_times_out_as_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        // Accept connections and hold them open without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = OllamaClient::new(
            &format!("http://{addr}"),
            "nomic-embed-text",
            4,
            Duration::from_millis(200),
        )
        .expect("client");
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.generate_embeddings(vec!["stalled".into()]),
        )
        .await
        .expect("request must give up on its own");

        assert!(result.is_err());
        server.abort();
    }
}
