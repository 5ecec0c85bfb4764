//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The request did not complete before its deadline.
    #[error("Qdrant request timed out after {after:?}")]
    Timeout {
        /// Deadline that elapsed.
        after: Duration,
    },
}

impl QdrantError {
    /// Whether repeating the same request later could succeed.
    ///
    /// Transport failures (connect, timeout, reset), elapsed deadlines, and `408`, `429` and
    /// `5xx` responses are transient; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidUrl(_) => false,
            Self::Timeout { .. } => true,
            Self::Http(error) => {
                error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
            }
            Self::UnexpectedStatus { status, .. } => {
                *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error()
            }
        }
    }

    /// Whether the request body exceeded the server's size limit.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedStatus { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE
        )
    }

    /// Whether retrying the same points in smaller requests can plausibly succeed.
    pub fn splitting_may_help(&self) -> bool {
        self.is_transient() || self.is_payload_too_large()
    }
}

/// Distance metric configured on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distance {
    /// Cosine similarity.
    #[default]
    Cosine,
}

impl Distance {
    /// Name understood by the Qdrant REST API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "Cosine",
        }
    }
}

/// Scored payload returned by Qdrant queries.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Numeric identifier of the point.
    pub id: u64,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Optional payload associated with the vector.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
