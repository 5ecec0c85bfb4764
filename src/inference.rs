//! Per-chunk embedding and summarization with timeouts, retries and window-level fan-out.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError},
    qdrant::PointId,
    summarization::{SummarizationClient, SummarizationClientError},
};
use futures_util::future::join_all;
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use thiserror::Error;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Failure to produce the embedding or summary of one chunk.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The embedding provider failed.
    #[error("embedding failed: {0}")]
    Embedding(#[source] EmbeddingClientError),
    /// The summarization provider failed.
    #[error("summarization failed: {0}")]
    Summarization(#[source] SummarizationClientError),
    /// A single provider call exceeded its timeout on the final attempt.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Which call timed out.
        operation: &'static str,
        /// Per-call timeout that elapsed.
        after: Duration,
    },
    /// The provider returned a vector of the wrong length.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured collection dimension.
        expected: usize,
        /// Length of the returned vector.
        actual: usize,
    },
    /// The whole window did not finish before its deadline.
    #[error("inference window exceeded its deadline of {after:?}")]
    WindowDeadline {
        /// Window deadline that elapsed.
        after: Duration,
    },
    /// Blank text was submitted.
    #[error("cannot run inference on empty text")]
    EmptyInput,
}

/// Embedding and summary computed for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkInference {
    /// Embedding vector, already checked against the expected dimension.
    pub embedding: Vec<f32>,
    /// Chunk summary.
    pub summary: String,
}

/// Timeouts, retry budget and dimension check applied to every inference call.
#[derive(Debug, Clone, Copy)]
pub struct InferencePolicy {
    /// Timeout for a single provider call.
    pub timeout: Duration,
    /// Additional attempts after a retryable failure.
    pub max_retries: u32,
    /// Deadline for a whole window of chunks.
    pub window_timeout: Duration,
    /// Required embedding length.
    pub expected_dimension: usize,
    /// Delay before the first retry; doubles on each subsequent one.
    pub initial_backoff: Duration,
}

impl InferencePolicy {
    /// Policy derived from runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.inference_timeout(),
            max_retries: config.inference_max_retries,
            window_timeout: config.window_timeout(),
            expected_dimension: config.embedding_dimension,
            initial_backoff: INITIAL_BACKOFF,
        }
    }
}

/// Combines an embedder and a summarizer behind one per-chunk call.
#[derive(Clone)]
pub struct InferenceClient {
    embedder: Arc<dyn EmbeddingClient>,
    summarizer: Arc<dyn SummarizationClient>,
    policy: InferencePolicy,
}

impl InferenceClient {
    /// Wrap the given providers with `policy`.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        summarizer: Arc<dyn SummarizationClient>,
        policy: InferencePolicy,
    ) -> Self {
        Self {
            embedder,
            summarizer,
            policy,
        }
    }

    /// Embed and summarize `text` concurrently.
    pub async fn infer(&self, text: &str) -> Result<ChunkInference, InferenceError> {
        if text.trim().is_empty() {
            return Err(InferenceError::EmptyInput);
        }

        let (embedding, summary) = tokio::join!(
            self.call_with_retry(
                "embedding",
                || self.embedder.embed(text),
                EmbeddingClientError::is_retryable,
                InferenceError::Embedding,
            ),
            self.call_with_retry(
                "summarization",
                || self.summarizer.summarize(text),
                SummarizationClientError::is_retryable,
                InferenceError::Summarization,
            ),
        );

        let embedding = embedding?;
        if embedding.len() != self.policy.expected_dimension {
            return Err(InferenceError::DimensionMismatch {
                expected: self.policy.expected_dimension,
                actual: embedding.len(),
            });
        }

        Ok(ChunkInference {
            embedding,
            summary: summary?,
        })
    }

    /// Run [`infer`](Self::infer) for every item concurrently, keyed by point id.
    ///
    /// When the window deadline passes every item resolves to
    /// [`InferenceError::WindowDeadline`].
    pub async fn infer_window(
        &self,
        items: &[(PointId, &str)],
    ) -> HashMap<PointId, Result<ChunkInference, InferenceError>> {
        let calls = items
            .iter()
            .map(|&(id, text)| async move { (id, self.infer(text).await) });

        match tokio::time::timeout(self.policy.window_timeout, join_all(calls)).await {
            Ok(results) => results.into_iter().collect(),
            Err(_) => {
                tracing::warn!(
                    items = items.len(),
                    deadline = ?self.policy.window_timeout,
                    "Inference window deadline exceeded"
                );
                items
                    .iter()
                    .map(|&(id, _)| {
                        (
                            id,
                            Err(InferenceError::WindowDeadline {
                                after: self.policy.window_timeout,
                            }),
                        )
                    })
                    .collect()
            }
        }
    }

    async fn call_with_retry<T, E, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
        retryable: fn(&E) -> bool,
        wrap: fn(E) -> InferenceError,
    ) -> Result<T, InferenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        let mut backoff = self.policy.initial_backoff;
        loop {
            let failure = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) if !retryable(&error) => return Err(wrap(error)),
                Ok(Err(error)) => wrap(error),
                Err(_) => InferenceError::Timeout {
                    operation,
                    after: self.policy.timeout,
                },
            };

            if attempt >= self.policy.max_retries {
                return Err(failure);
            }
            attempt += 1;
            tracing::warn!(operation, attempt, error = %failure, "Retrying inference call");
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{embedding::HashEmbeddingClient, summarization::ExtractiveSummarizer};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIMENSION: usize = 8;

    fn policy() -> InferencePolicy {
        InferencePolicy {
            timeout: Duration::from_secs(2),
            max_retries: 2,
            window_timeout: Duration::from_secs(5),
            expected_dimension: DIMENSION,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn client(embedder: Arc<dyn EmbeddingClient>, policy: InferencePolicy) -> InferenceClient {
        InferenceClient::new(embedder, Arc::new(ExtractiveSummarizer::new(20)), policy)
    }

    /// Fails with `error` for the first `failures` calls, then embeds.
    struct FlakyEmbedder {
        failures: usize,
        status: Option<StatusCode>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(match self.status {
                    Some(status) => EmbeddingClientError::GenerationFailed {
                        status,
                        message: "rejected".into(),
                    },
                    None => EmbeddingClientError::ProviderUnavailable("connection reset".into()),
                });
            }
            Ok(HashEmbeddingClient::new(DIMENSION).encode(text))
        }
    }

    /// Fails for texts containing "poison", sleeps for texts containing "slow".
    struct SelectiveEmbedder;

    #[async_trait]
    impl EmbeddingClient for SelectiveEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
            if text.contains("poison") {
                return Err(EmbeddingClientError::InvalidResponse("bad vector".into()));
            }
            if text.contains("slow") {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Ok(HashEmbeddingClient::new(DIMENSION).encode(text))
        }
    }

    fn point(doc_id: u64, chunk_id: u64) -> PointId {
        PointId::new(doc_id, chunk_id).expect("id")
    }

    #[tokio::test]
    async fn infer_returns_embedding_and_summary() {
        let client = client(Arc::new(HashEmbeddingClient::new(DIMENSION)), policy());
        let result = client
            .infer("Dormitory applications close in May. Late forms are not accepted.")
            .await
            .expect("inference");
        assert_eq!(result.embedding.len(), DIMENSION);
        assert_eq!(result.summary, "Dormitory applications close in May. Late forms are not accepted.");
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let embedder = Arc::new(FlakyEmbedder {
            failures: 2,
            status: None,
            calls: AtomicUsize::new(0),
        });
        let client = client(embedder.clone(), policy());
        client.infer("text").await.expect("third attempt succeeds");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_stop_at_the_budget() {
        let embedder = Arc::new(FlakyEmbedder {
            failures: 10,
            status: Some(StatusCode::SERVICE_UNAVAILABLE),
            calls: AtomicUsize::new(0),
        });
        let client = client(embedder.clone(), policy());
        let error = client.infer("text").await.expect_err("budget exhausted");
        assert!(matches!(error, InferenceError::Embedding(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let embedder = Arc::new(FlakyEmbedder {
            failures: 10,
            status: Some(StatusCode::BAD_REQUEST),
            calls: AtomicUsize::new(0),
        });
        let client = client(embedder.clone(), policy());
        assert!(client.infer("text").await.is_err());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let client = client(Arc::new(HashEmbeddingClient::new(DIMENSION + 1)), policy());
        let error = client.infer("text").await.expect_err("mismatch");
        assert!(matches!(
            error,
            InferenceError::DimensionMismatch { expected: 8, actual: 9 }
        ));
    }

    #[tokio::test]
    async fn empty_text_never_reaches_providers() {
        let embedder = Arc::new(FlakyEmbedder {
            failures: 0,
            status: None,
            calls: AtomicUsize::new(0),
        });
        let client = client(embedder.clone(), policy());
        assert!(matches!(client.infer(" \n ").await, Err(InferenceError::EmptyInput)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let mut policy = policy();
        policy.timeout = Duration::from_millis(20);
        policy.max_retries = 0;
        let client = client(Arc::new(SelectiveEmbedder), policy);
        let error = client.infer("slow chunk").await.expect_err("timeout");
        assert!(matches!(error, InferenceError::Timeout { operation: "embedding", .. }));
    }

    #[tokio::test]
    async fn window_results_are_keyed_and_isolated() {
        let client = client(Arc::new(SelectiveEmbedder), policy());
        let items = [
            (point(0, 0), "first chunk"),
            (point(0, 1), "poison chunk"),
            (point(1, 0), "third chunk"),
        ];
        let results = client.infer_window(&items).await;

        assert_eq!(results.len(), 3);
        assert!(results[&point(0, 0)].is_ok());
        assert!(matches!(results[&point(0, 1)], Err(InferenceError::Embedding(_))));
        let third = results[&point(1, 0)].as_ref().expect("third chunk");
        assert_eq!(third.embedding, HashEmbeddingClient::new(DIMENSION).encode("third chunk"));
        assert_eq!(third.summary, "third chunk");
    }

    #[tokio::test]
    async fn window_deadline_fails_every_member() {
        let mut policy = policy();
        policy.window_timeout = Duration::from_millis(30);
        let client = client(Arc::new(SelectiveEmbedder), policy);
        let items = [(point(0, 0), "slow one"), (point(0, 1), "fast one")];
        let results = client.infer_window(&items).await;

        assert_eq!(results.len(), 2);
        assert!(
            results
                .values()
                .all(|result| matches!(result, Err(InferenceError::WindowDeadline { .. })))
        );
    }
}
