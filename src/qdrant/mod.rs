//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::{QdrantService, VectorIndex};
pub use payload::{
    ChunkPayload, IndexPoint, MAX_CHUNKS_PER_DOCUMENT, PointId, PointIdError, truncate_chars,
};
pub use types::{Distance, QdrantError, ScoredPoint};
