//! Document and chunk records plus parser errors.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Source format of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// Office Open XML word-processing document (`.docx`).
    Word,
    /// Portable Document Format file (`.pdf`).
    Pdf,
}

impl DocType {
    /// Detect the document type from a file extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "docx" => Some(Self::Word),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word => f.write_str("word"),
            Self::Pdf => f.write_str("pdf"),
        }
    }
}

/// Normalized text produced by the parser for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    /// File base name, extension included.
    pub doc_title: String,
    /// Leading URL of the document when present, otherwise the file base name.
    pub doc_source: String,
    /// Sanitized text joined with single spaces.
    pub raw_text: String,
}

/// A parsed document awaiting (or holding) its chunks.
#[derive(Debug, Clone)]
pub struct Document {
    /// Position of the file in the sorted enumeration, starting at zero.
    pub doc_id: u64,
    /// Source format.
    pub doc_type: DocType,
    /// File base name, extension included.
    pub doc_title: String,
    /// Leading URL of the document when present, otherwise the file base name.
    pub doc_source: String,
    /// Sanitized document text.
    pub raw_text: String,
    /// Ordered chunks populated by the chunker.
    pub chunk_list: Vec<Chunk>,
}

impl Document {
    /// Build a document with an empty chunk list from parser output.
    pub fn new(doc_id: u64, doc_type: DocType, parsed: ParsedText) -> Self {
        let ParsedText {
            doc_title,
            doc_source,
            raw_text,
        } = parsed;
        Self {
            doc_id,
            doc_type,
            doc_title,
            doc_source,
            raw_text,
            chunk_list: Vec::new(),
        }
    }
}

/// Contiguous, independently embeddable unit of a document's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Identifier of the owning document.
    pub doc_id: u64,
    /// Zero-based position of the chunk within its document.
    pub chunk_id: u64,
    /// Chunk text.
    pub body: String,
    /// Embedding vector; empty until computed.
    pub embedding: Vec<f32>,
    /// Short summary; empty until computed.
    pub summary: String,
}

impl Chunk {
    /// Create a chunk whose embedding and summary are still pending.
    pub fn new(doc_id: u64, chunk_id: u64, body: impl Into<String>) -> Self {
        Self {
            doc_id,
            chunk_id,
            body: body.into(),
            embedding: Vec::new(),
            summary: String::new(),
        }
    }
}

/// Errors raised while reading a source file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file could not be read from disk.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File being parsed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The Word container is not a readable ZIP archive.
    #[error("malformed archive {}: {source}", path.display())]
    Archive {
        /// File being parsed.
        path: PathBuf,
        /// Underlying archive failure.
        #[source]
        source: zip::result::ZipError,
    },
    /// A required part of the Word container is absent.
    #[error("{} is missing required part {part}", path.display())]
    MissingPart {
        /// File being parsed.
        path: PathBuf,
        /// Name of the missing archive entry.
        part: &'static str,
    },
    /// The Word document body is not well-formed XML.
    #[error("malformed document XML in {}: {source}", path.display())]
    Xml {
        /// File being parsed.
        path: PathBuf,
        /// Underlying XML failure.
        #[source]
        source: quick_xml::Error,
    },
    /// The PDF text layer could not be extracted.
    #[error("failed to extract PDF text from {}: {reason}", path.display())]
    Pdf {
        /// File being parsed.
        path: PathBuf,
        /// Diagnostic reported by the PDF library.
        reason: String,
    },
}

impl ParseError {
    /// Path of the file that failed to parse.
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. }
            | Self::Archive { path, .. }
            | Self::MissingPart { path, .. }
            | Self::Xml { path, .. }
            | Self::Pdf { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_type_detection_ignores_case() {
        assert_eq!(
            DocType::from_path(Path::new("a/Report.DOCX")),
            Some(DocType::Word)
        );
        assert_eq!(DocType::from_path(Path::new("scan.pdf")), Some(DocType::Pdf));
        assert_eq!(DocType::from_path(Path::new("notes.txt")), None);
        assert_eq!(DocType::from_path(Path::new("README")), None);
    }

    #[test]
    fn new_document_starts_without_chunks() {
        let doc = Document::new(
            4,
            DocType::Pdf,
            ParsedText {
                doc_title: "a.pdf".into(),
                doc_source: "a.pdf".into(),
                raw_text: "text".into(),
            },
        );
        assert_eq!(doc.doc_id, 4);
        assert!(doc.chunk_list.is_empty());
    }
}
