//! Ingestion pipeline: chunking, batched upload orchestration, and retrieval.

pub mod chunking;
mod search;
mod service;
pub mod types;

pub use chunking::{Chunker, TokenChunker};
pub use search::Retriever;
pub use service::UploadPipeline;
pub use types::{
    ChunkingError, CollectionTarget, IngestReport, SearchError, SearchHit, SkipStage,
    SkippedDocument, UploadError, UploadRequest, UploadSettings,
};
