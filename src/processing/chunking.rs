//! Chunk boundaries for parsed documents.
//!
//! The pipeline only depends on the [`Chunker`] trait. [`TokenChunker`] is the default
//! implementation:
//!
//! - Automatic sizing: derive a token budget from the embedding model's context window and clamp
//!   it to a conservative range; `TEXT_SPLITTER_CHUNK_SIZE` overrides it.
//! - Overlap: `TEXT_SPLITTER_CHUNK_OVERLAP` carries a token tail of the previous chunk into the
//!   next one without exceeding the budget.
//! - Token counting: `tiktoken-rs` for OpenAI encodings, whitespace counting for local models
//!   whose tokenizer is unknown.
//! - PDF documents are chunked page by page, so no chunk spans a page-break marker.

use crate::config::{Config, EmbeddingProvider};
use crate::document::{Chunk, DocType, Document, PAGE_BREAK_PREFIX, PAGE_BREAK_SUFFIX};
use anyhow::Error as TokenizerError;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    r50k_base,
};

use super::types::ChunkingError;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;
const DEFAULT_CONTEXT_WINDOW: usize = 8192;

/// Splits a document's text into an ordered sequence of chunks.
pub trait Chunker: Send + Sync {
    /// Produce chunks numbered from zero in document order. Blank pieces are never emitted.
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, ChunkingError>;
}

/// Token-budgeted semantic chunker built on `semchunk-rs`.
#[derive(Clone)]
pub struct TokenChunker {
    chunk_size: usize,
    overlap: usize,
    tokenizer: Tokenizer,
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl TokenChunker {
    /// Build a chunker whose token counter matches the embedding model.
    pub fn new(
        chunk_size: usize,
        overlap: usize,
        provider: EmbeddingProvider,
        model: &str,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap,
            tokenizer: build_tokenizer(provider, model)?,
        })
    }

    /// Build a chunker that counts whitespace-separated words as tokens.
    pub fn with_whitespace_counter(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            overlap,
            tokenizer: Tokenizer::Whitespace,
        })
    }

    /// Build a chunker from runtime configuration.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        let chunk_size = determine_chunk_size(
            config.text_splitter_chunk_size,
            config.embedding_provider,
            &config.embedding_model,
        );
        tracing::debug!(
            chunk_size,
            override = config.text_splitter_chunk_size,
            overlap = config.text_splitter_chunk_overlap,
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            "Derived chunk size"
        );
        Self::new(
            chunk_size,
            config.text_splitter_chunk_overlap,
            config.embedding_provider,
            &config.embedding_model,
        )
    }

    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let tokenizer = self.tokenizer.clone();
        let chunker = semchunk_rs::Chunker::new(
            self.chunk_size,
            Box::new(move |segment: &str| tokenizer.count(segment)),
        );
        apply_overlap(
            chunker.chunk(text),
            self.chunk_size,
            self.overlap,
            &self.tokenizer,
        )
    }
}

impl Chunker for TokenChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, ChunkingError> {
        let pieces: Vec<String> = match document.doc_type {
            DocType::Word => self.split(&document.raw_text),
            DocType::Pdf => split_pages(&document.raw_text)
                .into_iter()
                .flat_map(|page| self.split(page))
                .collect(),
        };

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|piece| piece.trim().to_string())
            .filter(|piece| !piece.is_empty())
            .enumerate()
            .map(|(index, body)| Chunk::new(document.doc_id, index as u64, body))
            .collect();

        tracing::debug!(
            doc_id = document.doc_id,
            doc_type = %document.doc_type,
            chunks = chunks.len(),
            "Chunked document"
        );
        Ok(chunks)
    }
}

/// Split PDF text on page-break markers, dropping blank pages.
pub(crate) fn split_pages(text: &str) -> Vec<&str> {
    let mut pages = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(PAGE_BREAK_PREFIX) {
        pages.push(&rest[..start]);
        let after_prefix = &rest[start + PAGE_BREAK_PREFIX.len()..];
        match after_prefix.find(PAGE_BREAK_SUFFIX) {
            Some(end) => rest = &after_prefix[end + PAGE_BREAK_SUFFIX.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    pages.push(rest);

    pages
        .into_iter()
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect()
}

/// Determine the chunk size, respecting an explicit override.
///
/// Without an override the size is a quarter of the model's context window, clamped into
/// `[256, 1024]`.
pub(crate) fn determine_chunk_size(
    override_size: Option<usize>,
    provider: EmbeddingProvider,
    model: &str,
) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = embedding_context_window(provider, model);
    (window / 4).clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

/// Look up the embedding context window for a given provider/model combination.
pub(crate) fn embedding_context_window(provider: EmbeddingProvider, model: &str) -> usize {
    match provider {
        EmbeddingProvider::OpenAI => {
            if model.starts_with("text-embedding-3") || model.starts_with("text-embedding-ada-002")
            {
                DEFAULT_CONTEXT_WINDOW
            } else {
                get_context_size(model)
            }
        }
        EmbeddingProvider::Ollama => {
            let normalized = model.to_lowercase();
            match normalized.as_str() {
                "nomic-embed-text" | "mxbai-embed-large" | "bge-m3" => DEFAULT_CONTEXT_WINDOW,
                value if value.contains("all-minilm") => 512,
                value if value.contains("e5-large") => 4096,
                _ => {
                    tracing::trace!(model, "Using default Ollama context window estimate");
                    4096
                }
            }
        }
        EmbeddingProvider::Hash => DEFAULT_CONTEXT_WINDOW,
    }
}

/// Token counting strategy matched to the embedding model.
#[derive(Clone)]
enum Tokenizer {
    /// BPE encoding from `tiktoken-rs`.
    Bpe(Arc<CoreBPE>),
    /// Whitespace-separated words; blank non-empty text counts as one token.
    Whitespace,
}

impl Tokenizer {
    fn count(&self, text: &str) -> usize {
        match self {
            Self::Bpe(encoding) => encoding.encode_ordinary(text).len(),
            Self::Whitespace => {
                let tokens = text.split_whitespace().count();
                if tokens == 0 && !text.is_empty() {
                    1
                } else {
                    tokens
                }
            }
        }
    }

    /// Longest whitespace-trimmed suffix of `text` whose token count fits `budget`.
    fn suffix_within<'a>(&self, text: &'a str, budget: usize) -> &'a str {
        if budget == 0 {
            return "";
        }
        match self {
            Self::Bpe(encoding) => {
                let tokens = encoding.encode_ordinary(text);
                if tokens.len() <= budget {
                    return text.trim_start();
                }
                let tail_bytes: usize = encoding
                    ._decode_native_and_split(tokens[tokens.len() - budget..].to_vec())
                    .map(|bytes| bytes.len())
                    .sum();
                let mut start = text.len().saturating_sub(tail_bytes);
                while !text.is_char_boundary(start) {
                    start += 1;
                }
                // Re-encoding a suffix can merge differently at its first token.
                let mut candidate = text[start..].trim_start();
                while self.count(candidate) > budget {
                    let mut chars = candidate.chars();
                    chars.next();
                    candidate = chars.as_str().trim_start();
                }
                candidate
            }
            Self::Whitespace => {
                let word_starts: Vec<usize> = text
                    .char_indices()
                    .filter(|&(offset, ch)| {
                        !ch.is_whitespace()
                            && text[..offset]
                                .chars()
                                .next_back()
                                .is_none_or(char::is_whitespace)
                    })
                    .map(|(offset, _)| offset)
                    .collect();
                if word_starts.len() <= budget {
                    return text.trim_start();
                }
                &text[word_starts[word_starts.len() - budget]..]
            }
        }
    }
}

fn build_tokenizer(provider: EmbeddingProvider, model: &str) -> Result<Tokenizer, ChunkingError> {
    match provider {
        EmbeddingProvider::OpenAI => build_bpe_tokenizer(model),
        EmbeddingProvider::Ollama => match build_bpe_tokenizer(model) {
            Ok(tokenizer) => Ok(tokenizer),
            Err(error) => {
                tracing::warn!(
                    model,
                    error = %error,
                    "Tokenizer unavailable for Ollama model; falling back to whitespace counter"
                );
                Ok(Tokenizer::Whitespace)
            }
        },
        EmbeddingProvider::Hash => Ok(Tokenizer::Whitespace),
    }
}

fn build_bpe_tokenizer(model: &str) -> Result<Tokenizer, ChunkingError> {
    let target = match model.trim() {
        "" => "cl100k_base",
        trimmed => trimmed,
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    Ok(Tokenizer::Bpe(Arc::new(encoding)))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    if let Ok(encoding) = get_bpe_from_model(model) {
        return Ok(encoding);
    }
    match model {
        "o200k_base" => o200k_base(),
        "p50k_base" => p50k_base(),
        "r50k_base" | "gpt2" => r50k_base(),
        _ => {
            tracing::debug!(model, "Falling back to 'cl100k_base' encoding for token counting");
            cl100k_base()
        }
    }
}

/// Prefix each chunk with a token-limited tail of its predecessor, staying within `chunk_size`.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    tokenizer: &Tokenizer,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for current in chunks {
        let next = match previous.as_deref() {
            None => current.clone(),
            Some(prior) => {
                let tail = tokenizer.suffix_within(prior, effective_overlap);
                let combined = if tail.is_empty() {
                    current.clone()
                } else {
                    format!("{} {}", tail.trim_end(), current.trim_start())
                };
                tokenizer.suffix_within(&combined, chunk_size).to_string()
            }
        };
        overlapped.push(next);
        previous = Some(current);
    }

    overlapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ParsedText;

    fn document(doc_type: DocType, raw_text: &str) -> Document {
        Document::new(
            7,
            doc_type,
            ParsedText {
                doc_title: "t".into(),
                doc_source: "t".into(),
                raw_text: raw_text.into(),
            },
        )
    }

    #[test]
    fn word_documents_chunk_within_budget() {
        let chunker = TokenChunker::with_whitespace_counter(2, 0).expect("chunker");
        let chunks = chunker
            .chunk(&document(DocType::Word, "one two three four five"))
            .expect("chunks");
        let bodies: Vec<_> = chunks.iter().map(|chunk| chunk.body.as_str()).collect();
        assert_eq!(bodies, vec!["one two", "three four", "five"]);
        let ids: Vec<_> = chunks.iter().map(|chunk| chunk.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(chunks.iter().all(|chunk| chunk.doc_id == 7));
        assert!(chunks.iter().all(|chunk| chunk.embedding.is_empty()));
    }

    #[test]
    fn pdf_chunks_never_span_pages_or_include_markers() {
        let chunker = TokenChunker::with_whitespace_counter(50, 0).expect("chunker");
        let chunks = chunker
            .chunk(&document(
                DocType::Pdf,
                "alpha beta <PAGE_BREAK: 0> <PAGE_BREAK: 1> gamma delta <PAGE_BREAK: 2>",
            ))
            .expect("chunks");
        let bodies: Vec<_> = chunks.iter().map(|chunk| chunk.body.as_str()).collect();
        assert_eq!(bodies, vec!["alpha beta", "gamma delta"]);
        assert_eq!(chunks[1].chunk_id, 1);
    }

    #[test]
    fn blank_documents_produce_no_chunks() {
        let chunker = TokenChunker::with_whitespace_counter(4, 0).expect("chunker");
        assert!(chunker.chunk(&document(DocType::Word, "   ")).expect("chunks").is_empty());
        assert!(
            chunker
                .chunk(&document(DocType::Pdf, "<PAGE_BREAK: 0>"))
                .expect("chunks")
                .is_empty()
        );
    }

    #[test]
    fn overlap_carries_tail_within_budget() {
        let chunker = TokenChunker::with_whitespace_counter(3, 1).expect("chunker");
        let chunks = chunker
            .chunk(&document(DocType::Word, "one two three four five"))
            .expect("chunks");
        let bodies: Vec<_> = chunks.iter().map(|chunk| chunk.body.as_str()).collect();
        assert_eq!(bodies, vec!["one two three", "three four five"]);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let error = TokenChunker::with_whitespace_counter(0, 0).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn tiktoken_budget_is_respected() {
        let chunker =
            TokenChunker::new(5, 0, EmbeddingProvider::OpenAI, "text-embedding-3-small")
                .expect("chunker");
        let text = "The quick brown fox jumps over the lazy dog.";
        let chunks = chunker.chunk(&document(DocType::Word, text)).expect("chunks");
        let tokenizer = build_bpe_tokenizer("text-embedding-3-small").expect("tokenizer");
        for chunk in &chunks {
            assert!(tokenizer.count(&chunk.body) <= 5);
        }
        let words: Vec<&str> = chunks
            .iter()
            .flat_map(|chunk| chunk.body.split_whitespace())
            .collect();
        assert_eq!(words, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn whitespace_suffix_keeps_trailing_words() {
        let tokenizer = Tokenizer::Whitespace;
        assert_eq!(tokenizer.suffix_within("one  two three", 2), "two three");
        assert_eq!(tokenizer.suffix_within("  one two", 5), "one two");
        assert_eq!(tokenizer.suffix_within("one two", 0), "");
        assert_eq!(tokenizer.suffix_within("   ", 1), "");
    }

    #[test]
    fn bpe_suffix_fits_budget_from_one_encoding() {
        let tokenizer = build_bpe_tokenizer("text-embedding-3-small").expect("tokenizer");
        let text = "Overlap keeps the closing words of the previous chunk, even café names.";
        for budget in 1..=8 {
            let suffix = tokenizer.suffix_within(text, budget);
            assert!(tokenizer.count(suffix) <= budget, "budget {budget}: {suffix:?}");
            assert!(text.ends_with(suffix));
            assert!(!suffix.is_empty());
        }
        assert_eq!(tokenizer.suffix_within(text, 1_000), text);
    }

    #[test]
    fn split_pages_tolerates_unterminated_marker() {
        assert_eq!(split_pages("a <PAGE_BREAK: 0> b <PAGE_BREAK: 1"), vec!["a", "b"]);
    }

    #[test]
    fn determine_chunk_size_prefers_override() {
        assert_eq!(
            determine_chunk_size(Some(42), EmbeddingProvider::OpenAI, "text-embedding-3-large"),
            42
        );
    }

    #[test]
    fn determine_chunk_size_derives_from_context_window() {
        assert_eq!(
            determine_chunk_size(None, EmbeddingProvider::OpenAI, "text-embedding-3-large"),
            1024
        );
        assert_eq!(
            determine_chunk_size(None, EmbeddingProvider::Ollama, "all-minilm-l6-v2"),
            256
        );
        assert_eq!(determine_chunk_size(None, EmbeddingProvider::Hash, "any"), 1024);
    }
}
