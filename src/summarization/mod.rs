//! Chunk summarization providers.
//!
//! Hosted (OpenAI chat completions) and local (Ollama) models produce abstractive summaries.
//! When no provider is configured the [`ExtractiveSummarizer`] keeps leading sentences within
//! the word budget so every payload still carries a summary.

use crate::config::{Config, SummarizationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while attempting summarization.
#[derive(Debug, Error)]
pub enum SummarizationClientError {
    /// Provider was unreachable or the HTTP client could not be built.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate summary ({status}): {message}")]
    GenerationFailed {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Response body or error description.
        message: String,
    },
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl SummarizationClientError {
    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(_) => true,
            Self::GenerationFailed { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Interface implemented by summarization providers.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Produce a short summary of `text`.
    async fn summarize(&self, text: &str) -> Result<String, SummarizationClientError>;
}

/// Build the summarizer selected by `SUMMARIZATION_PROVIDER`.
pub fn client_from_config(
    config: &Config,
) -> Result<Arc<dyn SummarizationClient>, SummarizationClientError> {
    let max_words = config.summarization_max_words;
    let client: Arc<dyn SummarizationClient> = match config.summarization_provider {
        SummarizationProvider::None => Arc::new(ExtractiveSummarizer::new(max_words)),
        SummarizationProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                SummarizationClientError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiSummarizationClient::new(
                &config.openai_base_url,
                api_key,
                &config.summarization_model,
                max_words,
            )?)
        }
        SummarizationProvider::Ollama => Arc::new(OllamaSummarizationClient::new(
            &config.ollama_url,
            &config.summarization_model,
            max_words,
        )?),
    };
    tracing::debug!(
        provider = ?config.summarization_provider,
        model = %config.summarization_model,
        max_words,
        "Built summarization client"
    );
    Ok(client)
}

fn build_prompt(max_words: usize) -> String {
    format!(
        "You summarize passages taken from institutional documents. State only facts present in \
         the passage. Keep the passage's language. Return at most {max_words} words as a single \
         paragraph."
    )
}

fn http_client() -> Result<Client, SummarizationClientError> {
    Client::builder()
        .user_agent("docindex/summary")
        .build()
        .map_err(|error| SummarizationClientError::ProviderUnavailable(error.to_string()))
}

async fn read_failure(response: reqwest::Response) -> SummarizationClientError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    SummarizationClientError::GenerationFailed { status, message }
}

/// Summaries from the OpenAI chat completions API.
pub struct OpenAiSummarizationClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_words: usize,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiSummarizationClient {
    /// Create a client for `base_url` (without the `/v1` suffix).
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        max_words: usize,
    ) -> Result<Self, SummarizationClientError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_words,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl SummarizationClient for OpenAiSummarizationClient {
    async fn summarize(&self, text: &str) -> Result<String, SummarizationClientError> {
        let payload = json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": build_prompt(self.max_words) },
                { "role": "user", "content": text }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to reach OpenAI at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(read_failure(response).await);
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            SummarizationClientError::InvalidResponse(format!(
                "failed to decode OpenAI response: {error}"
            ))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                SummarizationClientError::InvalidResponse("response carried no message".into())
            })
    }
}

/// Summaries from a local Ollama runtime.
pub struct OllamaSummarizationClient {
    http: Client,
    base_url: String,
    model: String,
    max_words: usize,
}

impl OllamaSummarizationClient {
    /// Create a client for the Ollama runtime at `base_url`.
    pub fn new(
        base_url: &str,
        model: &str,
        max_words: usize,
    ) -> Result<Self, SummarizationClientError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_words,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl SummarizationClient for OllamaSummarizationClient {
    async fn summarize(&self, text: &str) -> Result<String, SummarizationClientError> {
        let payload = json!({
            "model": self.model,
            "system": build_prompt(self.max_words),
            "prompt": text,
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummarizationClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(read_failure(response).await);
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            SummarizationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(SummarizationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

/// Offline summarizer keeping the leading sentences that fit a word budget.
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveSummarizer {
    max_words: usize,
}

impl ExtractiveSummarizer {
    /// Create a summarizer emitting at most `max_words` words.
    pub const fn new(max_words: usize) -> Self {
        Self { max_words }
    }

    /// Summarize synchronously.
    pub fn extract(&self, text: &str) -> String {
        let mut kept: Vec<&str> = Vec::new();
        let mut used_words = 0usize;

        for sentence in sentences(text) {
            let words = sentence.split_whitespace().count();
            if used_words + words > self.max_words {
                break;
            }
            used_words += words;
            kept.push(sentence);
        }

        if kept.is_empty() {
            // Leading sentence alone exceeds the budget.
            return text
                .split_whitespace()
                .take(self.max_words)
                .collect::<Vec<_>>()
                .join(" ");
        }

        kept.join(" ")
    }
}

#[async_trait]
impl SummarizationClient for ExtractiveSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizationClientError> {
        Ok(self.extract(text))
    }
}

/// Sentences with their terminal punctuation, whitespace-trimmed, empties dropped.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaSummarizationClient::new(&server.base_url(), "llama3", 40).expect("client");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{ "model": "llama3", "prompt": "Long passage", "stream": false }"#);
                then.status(200).json_body(json!({
                    "response": " Summary text \n",
                    "done": true
                }));
            })
            .await;

        let summary = client.summarize("Long passage").await.expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "Summary text");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaSummarizationClient::new(&server.base_url(), "llama3", 40).expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client.summarize("text").await.expect_err("error response");
        assert!(matches!(
            &error,
            SummarizationClientError::GenerationFailed { status, message }
                if *status == StatusCode::INTERNAL_SERVER_ERROR && message.contains("boom")
        ));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn openai_client_reads_first_choice() {
        let server = MockServer::start_async().await;
        let client =
            OpenAiSummarizationClient::new(&server.base_url(), "sk-test".into(), "gpt-4o-mini", 60)
                .expect("client");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{ "model": "gpt-4o-mini", "temperature": 0.1 }"#);
                then.status(200).json_body(json!({
                    "id": "chatcmpl-1",
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "  요약입니다. " } }
                    ]
                }));
            })
            .await;

        let summary = client.summarize("원문").await.expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "요약입니다.");
    }

    #[tokio::test]
    async fn openai_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        let client = OpenAiSummarizationClient::new(&server.base_url(), "sk".into(), "m", 60)
            .expect("client");
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client.summarize("text").await.expect_err("no choices");
        assert!(matches!(error, SummarizationClientError::InvalidResponse(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn extractive_summary_keeps_whole_sentences_within_budget() {
        let summarizer = ExtractiveSummarizer::new(6);
        let summary = summarizer.extract("Applications open in March. Late forms are rejected. Ask the office.");
        assert_eq!(summary, "Applications open in March.");
        assert!(summary.split_whitespace().count() <= 6);
    }

    #[test]
    fn extractive_summary_truncates_overlong_first_sentence() {
        let summarizer = ExtractiveSummarizer::new(3);
        assert_eq!(summarizer.extract("one two three four five"), "one two three");
    }

    #[tokio::test]
    async fn extractive_summary_is_available_through_trait() {
        let summarizer: Arc<dyn SummarizationClient> = Arc::new(ExtractiveSummarizer::new(60));
        let summary = summarizer.summarize("First line\nSecond line").await.expect("summary");
        assert_eq!(summary, "First line Second line");
    }
}
