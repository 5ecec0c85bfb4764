//! Turning extracted paragraphs and pages into normalized document text.

use super::extract::{extract_docx_paragraphs, extract_pdf_pages};
use super::sanitize::{collapse_whitespace, is_url, sanitize_line};
use super::types::{DocType, ParseError, ParsedText};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Prefix of the marker appended after every PDF page.
pub const PAGE_BREAK_PREFIX: &str = "<PAGE_BREAK: ";
/// Suffix of the marker appended after every PDF page.
pub const PAGE_BREAK_SUFFIX: &str = ">";

/// Marker recording the end of the zero-based page `page_index`.
pub fn page_break_marker(page_index: usize) -> String {
    format!("{PAGE_BREAK_PREFIX}{page_index}{PAGE_BREAK_SUFFIX}")
}

/// Accumulates normalized lines, routing a leading URL into the document source.
struct LineAssembler {
    source: Option<String>,
    seen_first_line: bool,
    parts: Vec<String>,
}

impl LineAssembler {
    fn new() -> Self {
        Self {
            source: None,
            seen_first_line: false,
            parts: Vec::new(),
        }
    }

    fn push_line(&mut self, line: &str) {
        let normalized = collapse_whitespace(line);
        if normalized.is_empty() {
            return;
        }

        if !self.seen_first_line {
            self.seen_first_line = true;
            if is_url(&normalized) {
                self.source = Some(normalized);
                return;
            }
        }

        let cleaned = sanitize_line(&normalized);
        if !cleaned.is_empty() {
            self.parts.push(cleaned);
        }
    }

    fn push_marker(&mut self, marker: String) {
        self.parts.push(marker);
    }

    fn finish(self, file_name: &str) -> ParsedText {
        ParsedText {
            doc_title: file_name.to_string(),
            doc_source: self.source.unwrap_or_else(|| file_name.to_string()),
            raw_text: self.parts.join(" "),
        }
    }
}

/// Normalize the paragraphs of a Word document.
pub fn assemble_word<S: AsRef<str>>(file_name: &str, paragraphs: &[S]) -> ParsedText {
    let mut assembler = LineAssembler::new();
    for paragraph in paragraphs {
        assembler.push_line(paragraph.as_ref());
    }
    assembler.finish(file_name)
}

/// Normalize the pages of a PDF, appending a page-break marker after each page.
pub fn assemble_pdf<S: AsRef<str>>(file_name: &str, pages: &[S]) -> ParsedText {
    let mut assembler = LineAssembler::new();
    for (page_index, page) in pages.iter().enumerate() {
        for line in page.as_ref().split('\n') {
            assembler.push_line(line);
        }
        assembler.push_marker(page_break_marker(page_index));
    }
    assembler.finish(file_name)
}

/// Parse a file synchronously. Prefer [`FileParser`] from async code.
pub fn parse_file(path: &Path, doc_type: DocType) -> Result<ParsedText, ParseError> {
    let file_name = base_name(path);
    match doc_type {
        DocType::Word => {
            let paragraphs = extract_docx_paragraphs(path)?;
            Ok(assemble_word(&file_name, &paragraphs))
        }
        DocType::Pdf => {
            let pages = extract_pdf_pages(path)?;
            Ok(assemble_pdf(&file_name, &pages))
        }
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Parses a source file into normalized document text.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse `path` as a document of type `doc_type`.
    async fn parse(&self, path: &Path, doc_type: DocType) -> Result<ParsedText, ParseError>;
}

/// Parser backed by the on-disk Word and PDF extractors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileParser;

impl FileParser {
    /// Construct the file-backed parser.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentParser for FileParser {
    async fn parse(&self, path: &Path, doc_type: DocType) -> Result<ParsedText, ParseError> {
        let owned: PathBuf = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || parse_file(&owned, doc_type));
        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    "extractor panicked on malformed input".to_string()
                } else {
                    join_error.to_string()
                };
                tracing::warn!(path = %path.display(), %reason, "Extraction task failed");
                match doc_type {
                    DocType::Pdf => Err(ParseError::Pdf {
                        path: path.to_path_buf(),
                        reason,
                    }),
                    DocType::Word => Err(ParseError::Io {
                        path: path.to_path_buf(),
                        source: std::io::Error::other(reason),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_docx(path: &Path, paragraphs: &[&str]) {
        let body: String = paragraphs
            .iter()
            .map(|text| format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        let file = std::fs::File::create(path).expect("create docx");
        let mut archive = zip::ZipWriter::new(file);
        archive
            .start_file("word/document.xml", SimpleFileOptions::default())
            .expect("start entry");
        archive.write_all(xml.as_bytes()).expect("write entry");
        archive.finish().expect("finish archive");
    }

    #[test]
    fn leading_url_becomes_source_and_is_excluded() {
        let parsed = assemble_word(
            "guide.docx",
            &["  https://example.com/page ", "Body text here."],
        );
        assert_eq!(parsed.doc_title, "guide.docx");
        assert_eq!(parsed.doc_source, "https://example.com/page");
        assert_eq!(parsed.raw_text, "Body text here.");
        assert!(!parsed.raw_text.contains("example.com"));
    }

    #[test]
    fn plain_first_line_is_kept_and_source_is_file_name() {
        let parsed = assemble_word("guide.docx", &["Welcome: 안내 *", "Second paragraph"]);
        assert_eq!(parsed.doc_source, "guide.docx");
        assert_eq!(parsed.raw_text, "Welcome 안내 Second paragraph");
    }

    #[test]
    fn url_after_first_line_is_sanitized_as_text() {
        let parsed = assemble_word("a.docx", &["Intro", "https://example.com/x"]);
        assert_eq!(parsed.doc_source, "a.docx");
        assert_eq!(parsed.raw_text, "Intro httpsexample.comx");
    }

    #[test]
    fn blank_paragraphs_do_not_count_as_first_line() {
        let parsed = assemble_word("a.docx", &["", "   ", "http://example.org", "Body"]);
        assert_eq!(parsed.doc_source, "http://example.org");
        assert_eq!(parsed.raw_text, "Body");
    }

    #[test]
    fn pdf_pages_end_with_markers() {
        let parsed = assemble_pdf(
            "slides.pdf",
            &["Title line\nFirst   page body\n", "", "Third page"],
        );
        assert_eq!(
            parsed.raw_text,
            "Title line First page body <PAGE_BREAK: 0> <PAGE_BREAK: 1> Third page <PAGE_BREAK: 2>"
        );
        assert_eq!(parsed.doc_source, "slides.pdf");
    }

    #[test]
    fn pdf_leading_url_is_detected_across_pages() {
        let parsed = assemble_pdf("a.pdf", &["\n\n", "https://example.com/doc\nContent"]);
        assert_eq!(parsed.doc_source, "https://example.com/doc");
        assert_eq!(parsed.raw_text, "<PAGE_BREAK: 0> Content <PAGE_BREAK: 1>");
    }

    #[test]
    fn parsing_a_docx_file_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notice.docx");
        write_docx(&path, &["Scholarship notice", "Apply by (March 3)!"]);

        let first = parse_file(&path, DocType::Word).expect("first parse");
        let second = parse_file(&path, DocType::Word).expect("second parse");
        assert_eq!(first, second);
        assert_eq!(first.doc_title, "notice.docx");
        assert_eq!(first.raw_text, "Scholarship notice Apply by (March 3)!");
    }

    #[tokio::test]
    async fn file_parser_reports_malformed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4 truncated").expect("write");

        let error = FileParser::new()
            .parse(&path, DocType::Pdf)
            .await
            .expect_err("malformed pdf");
        assert_eq!(error.path(), path.as_path());
    }
}
