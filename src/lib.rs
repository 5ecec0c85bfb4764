#![deny(missing_docs)]

//! Core library for the docindex document ingestion tool.

/// Environment-driven configuration management.
pub mod config;
/// Word/PDF text extraction and normalization.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Concurrent per-chunk embedding and summarization.
pub mod inference;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion counters.
pub mod metrics;
/// Chunking, upload orchestration, and retrieval.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Summarization client abstraction and adapters.
pub mod summarization;
