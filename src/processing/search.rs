//! Query-time retrieval over an ingested collection.

use crate::{
    embedding::EmbeddingClient,
    processing::types::{SearchError, SearchHit},
    qdrant::{ChunkPayload, ScoredPoint, VectorIndex},
};
use serde_json::Value;
use std::sync::Arc;

/// Embeds a query and returns the nearest stored chunks.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    expected_dimension: usize,
}

impl Retriever {
    /// Build a retriever over `collection`.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        expected_dimension: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            expected_dimension,
        }
    }

    /// Return up to `top_k` hits for `query`, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;
        if vector.len() != self.expected_dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.expected_dimension,
                actual: vector.len(),
            });
        }

        let points = self.index.search(&self.collection, vector, top_k).await?;
        let mut hits: Vec<SearchHit> = points.into_iter().map(map_scored_point).collect();
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        tracing::debug!(collection = %self.collection, top_k, hits = hits.len(), "Search complete");
        Ok(hits)
    }
}

fn map_scored_point(point: ScoredPoint) -> SearchHit {
    let payload = point
        .payload
        .map(|map| {
            ChunkPayload::from_value(Value::Object(map)).unwrap_or_else(|error| {
                tracing::warn!(id = point.id, error = %error, "Malformed payload on search hit");
                ChunkPayload::default()
            })
        })
        .unwrap_or_default();

    SearchHit {
        id: point.id,
        score: point.score,
        doc_title: payload.doc_title,
        doc_source: payload.doc_source,
        raw_text: payload.raw_text,
        summary: payload.summary,
    }
}
