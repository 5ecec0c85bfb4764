//! Core data types and error definitions for the upload pipeline.

use crate::{config::Config, metrics::MetricsSnapshot, qdrant::QdrantError};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while turning document text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Fatal errors that stop an upload before its batch loop can run.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The input directory does not exist or is not a directory.
    #[error("input directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    /// The input directory could not be listed.
    #[error("failed to list input directory: {0}")]
    Enumerate(#[from] walkdir::Error),
    /// The target collection could not be prepared.
    #[error("failed to prepare collection '{collection}': {source}")]
    Collection {
        /// Collection being prepared.
        collection: String,
        /// Underlying Qdrant failure.
        #[source]
        source: QdrantError,
    },
    /// Pipeline settings are unusable.
    #[error("invalid pipeline settings: {0}")]
    InvalidSettings(String),
}

/// Errors emitted while orchestrating similarity searches.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Embedding provider failed to return a vector for the query text.
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingClientError),
    /// Qdrant search request returned an error response.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension configured for the collection.
        expected: usize,
        /// Actual embedding dimension produced by the provider.
        actual: usize,
    },
    /// The query text was blank.
    #[error("query text must not be empty")]
    EmptyQuery,
}

/// Which configured collection a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionTarget {
    /// Development collection.
    #[default]
    Dev,
    /// Production collection.
    Prod,
}

/// Tunables for the upload pipeline, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Collection written by development runs.
    pub dev_collection: String,
    /// Collection written by production runs.
    pub prod_collection: String,
    /// Dimensionality of the collection's vectors.
    pub vector_size: u64,
    /// Number of chunks per embedding/upsert window.
    pub embed_batch_size: usize,
    /// Maximum characters of chunk text stored in a payload.
    pub max_chunk_length: usize,
    /// Points per sub-batch on the degraded upsert path.
    pub fallback_batch_size: usize,
    /// Deadline for one upsert request; an elapsed upsert is treated as transient.
    pub upsert_timeout: Duration,
}

impl UploadSettings {
    /// Derive settings from runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            dev_collection: config.dev_collection.clone(),
            prod_collection: config.prod_collection.clone(),
            vector_size: config.embedding_dimension as u64,
            embed_batch_size: config.embed_batch_size,
            max_chunk_length: config.max_chunk_length,
            fallback_batch_size: config.upsert_fallback_batch_size,
            upsert_timeout: config.qdrant_timeout(),
        }
    }

    /// Collection name for `target`.
    pub fn collection(&self, target: CollectionTarget) -> &str {
        match target {
            CollectionTarget::Dev => &self.dev_collection,
            CollectionTarget::Prod => &self.prod_collection,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), UploadError> {
        if self.embed_batch_size == 0 {
            return Err(UploadError::InvalidSettings(
                "embed batch size must be greater than zero".into(),
            ));
        }
        if self.fallback_batch_size == 0 {
            return Err(UploadError::InvalidSettings(
                "fallback batch size must be greater than zero".into(),
            ));
        }
        if self.max_chunk_length == 0 {
            return Err(UploadError::InvalidSettings(
                "max chunk length must be greater than zero".into(),
            ));
        }
        if self.upsert_timeout.is_zero() {
            return Err(UploadError::InvalidSettings(
                "upsert timeout must be greater than zero".into(),
            ));
        }
        if self.vector_size == 0 {
            return Err(UploadError::InvalidSettings(
                "vector size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Parameters of a single upload run.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Directory holding the `.docx`/`.pdf` files to ingest.
    pub db_path: PathBuf,
    /// Wipe and recreate the target collection before uploading.
    pub recreate: bool,
    /// Collection selected for this run.
    pub target: CollectionTarget,
}

/// Pipeline stage at which a document was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipStage {
    /// Text extraction or normalization failed.
    Parse,
    /// Chunk boundary detection failed.
    Chunk,
}

/// A document that did not make it into the index.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    /// File that was skipped.
    pub path: PathBuf,
    /// Stage that failed.
    pub stage: SkipStage,
    /// Human-readable failure description.
    pub reason: String,
}

/// Final outcome of an upload run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Collection that received the points.
    pub collection: String,
    /// Counters accumulated during the run.
    pub counts: MetricsSnapshot,
    /// Documents dropped before upload, with reasons.
    pub skipped_documents: Vec<SkippedDocument>,
}

impl IngestReport {
    /// Whether every chunk that reached the batch loop was indexed.
    pub fn is_complete(&self) -> bool {
        self.skipped_documents.is_empty()
            && self.counts.chunks_rejected == 0
            && self.counts.chunks_failed == 0
            && self.counts.points_failed == 0
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = &self.counts;
        write!(
            f,
            "collection '{}': {} files, {} documents parsed, {} skipped; {} chunks ({} empty, {} rejected, {} failed inference); {} points upserted, {} failed; {} windows ({} degraded)",
            self.collection,
            counts.files_found,
            counts.documents_parsed,
            counts.documents_skipped,
            counts.chunks_total,
            counts.chunks_empty,
            counts.chunks_rejected,
            counts.chunks_failed,
            counts.points_upserted,
            counts.points_failed,
            counts.windows_total,
            counts.windows_degraded,
        )
    }
}

/// Structured search hit returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Point identifier (`doc_id * 1000 + chunk_id`).
    pub id: u64,
    /// Similarity score reported by Qdrant.
    pub score: f32,
    /// Title of the source document.
    pub doc_title: String,
    /// Source URL or file name of the document.
    pub doc_source: String,
    /// Stored (truncated) chunk text.
    pub raw_text: String,
    /// Stored chunk summary.
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> UploadSettings {
        UploadSettings {
            dev_collection: "dev".into(),
            prod_collection: "prod".into(),
            vector_size: 8,
            embed_batch_size: 4,
            max_chunk_length: 100,
            fallback_batch_size: 5,
            upsert_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn collection_follows_target() {
        let settings = settings();
        assert_eq!(settings.collection(CollectionTarget::Dev), "dev");
        assert_eq!(settings.collection(CollectionTarget::Prod), "prod");
        assert_eq!(CollectionTarget::default(), CollectionTarget::Dev);
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        assert!(settings().validate().is_ok());
        let mut broken = settings();
        broken.fallback_batch_size = 0;
        assert!(matches!(
            broken.validate(),
            Err(UploadError::InvalidSettings(_))
        ));
        let mut unbounded = settings();
        unbounded.upsert_timeout = Duration::ZERO;
        assert!(matches!(
            unbounded.validate(),
            Err(UploadError::InvalidSettings(_))
        ));
    }

    #[test]
    fn report_completeness_tracks_failures() {
        let mut report = IngestReport {
            collection: "dev".into(),
            counts: MetricsSnapshot::default(),
            skipped_documents: Vec::new(),
        };
        assert!(report.is_complete());
        report.counts.points_failed = 2;
        assert!(!report.is_complete());
        assert!(report.to_string().contains("2 failed"));
    }
}
