use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DEV_COLLECTION: &str = "docindex-dev";
const DEFAULT_PROD_COLLECTION: &str = "docindex-prod";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
const DEFAULT_EMBEDDING_DIMENSION: usize = 3072;
const DEFAULT_SUMMARIZATION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_SUMMARIZATION_MAX_WORDS: usize = 60;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_EMBED_BATCH_SIZE: usize = 32;
const DEFAULT_MAX_CHUNK_LENGTH: usize = 2000;
const DEFAULT_UPSERT_FALLBACK_BATCH_SIZE: usize = 5;
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_INFERENCE_MAX_RETRIES: u32 = 2;
const DEFAULT_WINDOW_TIMEOUT_SECS: u64 = 600;
const DEFAULT_QDRANT_TIMEOUT_SECS: u64 = 30;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was already installed for this process.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the ingestion pipeline and search path.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Collection targeted by development runs.
    pub dev_collection: String,
    /// Collection targeted by production runs.
    pub prod_collection: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Provider used to summarize each chunk.
    pub summarization_provider: SummarizationProvider,
    /// Model identifier used for abstractive summaries.
    pub summarization_model: String,
    /// Word budget requested from the summarizer.
    pub summarization_max_words: usize,
    /// Credentials for the OpenAI API, required when any provider is `openai`.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Number of chunks embedded, summarized and upserted together.
    pub embed_batch_size: usize,
    /// Maximum number of characters of chunk text stored in each payload.
    pub max_chunk_length: usize,
    /// Size of the sub-batches used when a full window upsert fails.
    pub upsert_fallback_batch_size: usize,
    /// Optional override for the automatic chunk size selection.
    pub text_splitter_chunk_size: Option<usize>,
    /// Token overlap between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Timeout applied to every embedding and summarization call, in seconds.
    pub inference_timeout_secs: u64,
    /// Retries attempted for a retryable inference failure.
    pub inference_max_retries: u32,
    /// Deadline for a whole window of inference calls, in seconds.
    pub window_timeout_secs: u64,
    /// Timeout applied to every Qdrant request, in seconds.
    pub qdrant_timeout_secs: u64,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic offline vectors derived from the text bytes.
    Hash,
}

/// Supported summarization backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarizationProvider {
    /// Extractive summaries computed locally.
    None,
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI chat completions API.
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as absent so that `.env` templates with empty entries fall back
    /// to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()));

        let embedding_provider: EmbeddingProvider = required("EMBEDDING_PROVIDER")?
            .parse()
            .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?;
        let summarization_provider: SummarizationProvider = optional("SUMMARIZATION_PROVIDER")
            .map(|value| {
                value.parse().map_err(|()| {
                    ConfigError::InvalidValue("SUMMARIZATION_PROVIDER".to_string())
                })
            })
            .transpose()?
            .unwrap_or(SummarizationProvider::None);

        let openai_api_key = optional("OPENAI_API_KEY");
        let needs_openai = embedding_provider == EmbeddingProvider::OpenAI
            || summarization_provider == SummarizationProvider::OpenAI;
        if needs_openai && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }

        Ok(Self {
            qdrant_url: required("QDRANT_URL")?,
            qdrant_api_key: optional("QDRANT_API_KEY"),
            dev_collection: optional("QDRANT_COLLECTION_DEV")
                .unwrap_or_else(|| DEFAULT_DEV_COLLECTION.to_string()),
            prod_collection: optional("QDRANT_COLLECTION_PROD")
                .unwrap_or_else(|| DEFAULT_PROD_COLLECTION.to_string()),
            embedding_provider,
            embedding_model: optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_positive(
                "EMBEDDING_DIMENSION",
                optional("EMBEDDING_DIMENSION"),
                DEFAULT_EMBEDDING_DIMENSION,
            )?,
            summarization_provider,
            summarization_model: optional("SUMMARIZATION_MODEL")
                .unwrap_or_else(|| DEFAULT_SUMMARIZATION_MODEL.to_string()),
            summarization_max_words: parse_positive(
                "SUMMARIZATION_MAX_WORDS",
                optional("SUMMARIZATION_MAX_WORDS"),
                DEFAULT_SUMMARIZATION_MAX_WORDS,
            )?,
            openai_api_key,
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            ollama_url: optional("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            embed_batch_size: parse_positive(
                "EMBED_BATCH_SIZE",
                optional("EMBED_BATCH_SIZE"),
                DEFAULT_EMBED_BATCH_SIZE,
            )?,
            max_chunk_length: parse_positive(
                "MAX_CHUNK_LENGTH",
                optional("MAX_CHUNK_LENGTH"),
                DEFAULT_MAX_CHUNK_LENGTH,
            )?,
            upsert_fallback_batch_size: parse_positive(
                "UPSERT_FALLBACK_BATCH_SIZE",
                optional("UPSERT_FALLBACK_BATCH_SIZE"),
                DEFAULT_UPSERT_FALLBACK_BATCH_SIZE,
            )?,
            text_splitter_chunk_size: optional("TEXT_SPLITTER_CHUNK_SIZE")
                .map(|value| {
                    value.parse().map_err(|_| {
                        ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".to_string())
                    })
                })
                .transpose()?,
            text_splitter_chunk_overlap: parse_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                optional("TEXT_SPLITTER_CHUNK_OVERLAP"),
                0,
            )?,
            inference_timeout_secs: parse_positive(
                "INFERENCE_TIMEOUT_SECS",
                optional("INFERENCE_TIMEOUT_SECS"),
                DEFAULT_INFERENCE_TIMEOUT_SECS,
            )?,
            inference_max_retries: parse_or(
                "INFERENCE_MAX_RETRIES",
                optional("INFERENCE_MAX_RETRIES"),
                DEFAULT_INFERENCE_MAX_RETRIES,
            )?,
            window_timeout_secs: parse_positive(
                "WINDOW_TIMEOUT_SECS",
                optional("WINDOW_TIMEOUT_SECS"),
                DEFAULT_WINDOW_TIMEOUT_SECS,
            )?,
            qdrant_timeout_secs: parse_positive(
                "QDRANT_TIMEOUT_SECS",
                optional("QDRANT_TIMEOUT_SECS"),
                DEFAULT_QDRANT_TIMEOUT_SECS,
            )?,
        })
    }

    /// Name of the collection selected by the dev/prod switch.
    pub fn collection_for(&self, prod: bool) -> &str {
        if prod {
            &self.prod_collection
        } else {
            &self.dev_collection
        }
    }

    /// Per-call inference timeout.
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    /// Deadline applied to a whole inference window.
    pub fn window_timeout(&self) -> Duration {
        Duration::from_secs(self.window_timeout_secs)
    }

    /// Deadline for a single Qdrant request.
    pub fn qdrant_timeout(&self) -> Duration {
        Duration::from_secs(self.qdrant_timeout_secs)
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_positive<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed = parse_or(key, value, default)?;
    if parsed <= T::default() {
        return Err(ConfigError::InvalidValue(key.to_string()));
    }
    Ok(parsed)
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for SummarizationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "extractive" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        dev_collection = %config.dev_collection,
        prod_collection = %config.prod_collection,
        embedding_provider = ?config.embedding_provider,
        summarization_provider = ?config.summarization_provider,
        embed_batch_size = config.embed_batch_size,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn applies_defaults_for_optional_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("QDRANT_URL", "http://127.0.0.1:6333"),
            ("EMBEDDING_PROVIDER", "hash"),
        ]))
        .expect("config");

        assert_eq!(config.dev_collection, "docindex-dev");
        assert_eq!(config.prod_collection, "docindex-prod");
        assert_eq!(config.embedding_dimension, 3072);
        assert_eq!(config.embed_batch_size, 32);
        assert_eq!(config.max_chunk_length, 2000);
        assert_eq!(config.upsert_fallback_batch_size, 5);
        assert_eq!(config.qdrant_timeout(), Duration::from_secs(30));
        assert_eq!(config.summarization_provider, SummarizationProvider::None);
        assert_eq!(config.collection_for(false), "docindex-dev");
        assert_eq!(config.collection_for(true), "docindex-prod");
    }

    #[test]
    fn missing_qdrant_url_is_fatal() {
        let error = Config::from_lookup(lookup_from(&[("EMBEDDING_PROVIDER", "hash")]))
            .expect_err("missing url");
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "QDRANT_URL"));
    }

    #[test]
    fn openai_provider_requires_credentials() {
        let error = Config::from_lookup(lookup_from(&[
            ("QDRANT_URL", "http://127.0.0.1:6333"),
            ("EMBEDDING_PROVIDER", "openai"),
        ]))
        .expect_err("missing key");
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "OPENAI_API_KEY"));
    }

    #[test]
    fn rejects_zero_qdrant_timeout() {
        let error = Config::from_lookup(lookup_from(&[
            ("QDRANT_URL", "http://127.0.0.1:6333"),
            ("EMBEDDING_PROVIDER", "hash"),
            ("QDRANT_TIMEOUT_SECS", "0"),
        ]))
        .expect_err("zero timeout");
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "QDRANT_TIMEOUT_SECS"));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let error = Config::from_lookup(lookup_from(&[
            ("QDRANT_URL", "http://127.0.0.1:6333"),
            ("EMBEDDING_PROVIDER", "hash"),
            ("EMBED_BATCH_SIZE", "0"),
        ]))
        .expect_err("zero batch");
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "EMBED_BATCH_SIZE"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("QDRANT_URL", "http://127.0.0.1:6333"),
            ("EMBEDDING_PROVIDER", "Ollama"),
            ("EMBEDDING_MODEL", "  "),
            ("SUMMARIZATION_PROVIDER", "ollama"),
            ("MAX_CHUNK_LENGTH", "500"),
        ]))
        .expect("config");
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(config.embedding_model, "text-embedding-3-large");
        assert_eq!(config.summarization_provider, SummarizationProvider::Ollama);
        assert_eq!(config.max_chunk_length, 500);
    }
}
