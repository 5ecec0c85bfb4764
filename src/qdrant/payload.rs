//! Point identity and the payload schema stored alongside each chunk vector.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Chunks per document addressable by the point id encoding.
pub const MAX_CHUNKS_PER_DOCUMENT: u64 = 1000;

/// Errors raised when a `(doc_id, chunk_id)` pair cannot be encoded into a point id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PointIdError {
    /// The chunk id would spill into the next document's id range.
    #[error("chunk id {chunk_id} of document {doc_id} exceeds the per-document limit of {MAX_CHUNKS_PER_DOCUMENT}")]
    ChunkIdOutOfRange {
        /// Owning document.
        doc_id: u64,
        /// Offending chunk id.
        chunk_id: u64,
    },
    /// The document id is too large to encode.
    #[error("document id {doc_id} is too large to encode")]
    DocIdOverflow {
        /// Offending document id.
        doc_id: u64,
    },
}

/// Identifier of a point in the vector index: `doc_id * 1000 + chunk_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(u64);

impl PointId {
    /// Encode a document/chunk pair, rejecting pairs that would collide with another document.
    pub fn new(doc_id: u64, chunk_id: u64) -> Result<Self, PointIdError> {
        if chunk_id >= MAX_CHUNKS_PER_DOCUMENT {
            return Err(PointIdError::ChunkIdOutOfRange { doc_id, chunk_id });
        }
        doc_id
            .checked_mul(MAX_CHUNKS_PER_DOCUMENT)
            .and_then(|base| base.checked_add(chunk_id))
            .map(Self)
            .ok_or(PointIdError::DocIdOverflow { doc_id })
    }

    /// Wrap a raw identifier read back from the index.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric identifier.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Owning document id.
    pub const fn doc_id(self) -> u64 {
        self.0 / MAX_CHUNKS_PER_DOCUMENT
    }

    /// Chunk id within the owning document.
    pub const fn chunk_id(self) -> u64 {
        self.0 % MAX_CHUNKS_PER_DOCUMENT
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Payload stored with every chunk vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Title of the source document.
    #[serde(default)]
    pub doc_title: String,
    /// Source URL or file name of the document.
    #[serde(default)]
    pub doc_source: String,
    /// Chunk text, truncated to the configured maximum length.
    #[serde(default)]
    pub raw_text: String,
    /// Model-generated summary of the chunk.
    #[serde(default)]
    pub summary: String,
}

impl ChunkPayload {
    /// Build a payload, truncating `body` to at most `max_chars` characters.
    pub fn new(doc_title: &str, doc_source: &str, body: &str, summary: String, max_chars: usize) -> Self {
        Self {
            doc_title: doc_title.to_string(),
            doc_source: doc_source.to_string(),
            raw_text: truncate_chars(body, max_chars).to_string(),
            summary,
        }
    }

    /// Decode a stored payload, defaulting absent fields.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// One vector-plus-payload record ready for upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexPoint {
    /// Point identifier.
    pub id: PointId,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Stored payload.
    pub payload: ChunkPayload,
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}
