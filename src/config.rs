use crate::store::DistanceMetric;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Offending raw value.
        value: String,
    },
    /// Values parsed individually but are inconsistent with each other.
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
    /// Configuration was installed twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the indexing service. Every field has a default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Vector store backend.
    pub vector_store: VectorStoreKind,
    /// Name of the index recreated by every indexing run.
    pub index_name: String,
    /// Similarity metric for the index.
    pub index_metric: DistanceMetric,
    /// Cloud identifier for serverless index placement.
    pub index_cloud: String,
    /// Region identifier for serverless index placement.
    pub index_region: String,
    /// Base URL of the Qdrant instance.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// API key for Pinecone.
    pub pinecone_api_key: Option<String>,
    /// Pinecone control-plane URL.
    pub pinecone_controller_url: String,
    /// Per-request timeout for vector store calls, in seconds.
    pub store_timeout_secs: u64,
    /// Embedding provider used to generate vectors.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// API key for the OpenAI embeddings endpoint.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Per-request timeout for embedding calls, in seconds.
    pub embedding_timeout_secs: u64,
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks.
    pub chunk_overlap: usize,
    /// Token ceiling for a single embedding request.
    pub max_input_tokens: usize,
    /// Concurrent embed+upsert workers per indexing run.
    pub indexing_workers: usize,
    /// Directory where uploaded files are persisted before extraction.
    pub upload_dir: PathBuf,
    /// Maximum accepted request body for uploads, in bytes.
    pub max_upload_bytes: usize,
    /// How long finished tasks remain pollable, in seconds.
    pub progress_ttl_secs: u64,
    /// Soft cap on tracked tasks before finished ones are evicted early.
    pub progress_max_tasks: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreKind {
    /// Qdrant over HTTP.
    Qdrant,
    /// Pinecone serverless.
    Pinecone,
    /// In-process store; contents are lost on exit.
    Memory,
}

/// Supported embedding backends for the indexing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing embedder.
    Hash,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let config = Self {
            vector_store: vars.parse("VECTOR_STORE", VectorStoreKind::Qdrant)?,
            index_name: vars.string("INDEX_NAME", "rag-agent-index"),
            index_metric: vars.parse("INDEX_METRIC", DistanceMetric::Cosine)?,
            index_cloud: vars.string("INDEX_CLOUD", "aws"),
            index_region: vars.string("INDEX_REGION", "us-east-1"),
            qdrant_url: vars.string("QDRANT_URL", "http://127.0.0.1:6333"),
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            pinecone_api_key: vars.optional("PINECONE_API_KEY"),
            pinecone_controller_url: vars
                .string("PINECONE_CONTROLLER_URL", "https://api.pinecone.io"),
            store_timeout_secs: vars.parse("STORE_TIMEOUT_SECS", 30)?,
            embedding_provider: vars.parse("EMBEDDING_PROVIDER", EmbeddingProvider::OpenAI)?,
            embedding_model: vars.string("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimension: vars.parse("EMBEDDING_DIMENSION", 1536)?,
            openai_api_key: vars.optional("OPENAI_API_KEY"),
            openai_base_url: vars.string("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            ollama_url: vars.string("OLLAMA_URL", "http://127.0.0.1:11434"),
            embedding_timeout_secs: vars.parse("EMBEDDING_TIMEOUT_SECS", 60)?,
            chunk_size: vars.parse("CHUNK_SIZE", 1000)?,
            chunk_overlap: vars.parse("CHUNK_OVERLAP", 100)?,
            max_input_tokens: vars.parse("MAX_INPUT_TOKENS", 300_000)?,
            indexing_workers: vars.parse("INDEXING_WORKERS", 5)?,
            upload_dir: PathBuf::from(vars.string("UPLOAD_DIR", "uploads")),
            max_upload_bytes: vars.parse("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            progress_ttl_secs: vars.parse("PROGRESS_TTL_SECS", 3600)?,
            progress_max_tasks: vars.parse("PROGRESS_MAX_TASKS", 1024)?,
            server_port: vars
                .optional("SERVER_PORT")
                .map(|value| {
                    value.parse().map_err(|_| ConfigError::InvalidValue {
                        key: "SERVER_PORT",
                        value,
                    })
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::Inconsistent(
                "EMBEDDING_DIMENSION must be greater than zero".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Inconsistent(
                "CHUNK_SIZE must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Inconsistent(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_input_tokens < self.chunk_size {
            return Err(ConfigError::Inconsistent(format!(
                "MAX_INPUT_TOKENS ({}) must be at least CHUNK_SIZE ({})",
                self.max_input_tokens, self.chunk_size
            )));
        }
        if self.indexing_workers == 0 {
            return Err(ConfigError::Inconsistent(
                "INDEXING_WORKERS must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Number of chunks sent per embedding request.
    pub fn embedding_batch_size(&self) -> usize {
        (self.max_input_tokens / self.chunk_size).max(1)
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value }),
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl FromStr for VectorStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "pinecone" => Ok(Self::Pinecone),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from `.env` and the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    install_config(Config::from_env()?)
}

/// Install an already-built configuration in the global cache.
pub fn install_config(config: Config) -> Result<&'static Config, ConfigError> {
    tracing::debug!(
        vector_store = ?config.vector_store,
        index = %config.index_name,
        embedding_provider = ?config.embedding_provider,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        workers = config.indexing_workers,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}
