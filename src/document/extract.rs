//! Raw text extraction from Word and PDF containers.
//!
//! Extraction returns the paragraph (Word) or page (PDF) strings as
//! the container stores them. Normalization, source detection and sanitization happen in
//! [`super::parse`].

use super::types::ParseError;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const WORD_BODY_PART: &str = "word/document.xml";

/// Read the body paragraphs of a `.docx` file in document order.
///
/// Only top-level body paragraphs are returned; table cells, headers, footers and drawing text
/// are not part of the document body.
pub fn extract_docx_paragraphs(path: &Path) -> Result<Vec<String>, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| ParseError::Archive {
        path: path.to_path_buf(),
        source,
    })?;

    let mut xml = String::new();
    {
        let mut entry = match archive.by_name(WORD_BODY_PART) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ParseError::MissingPart {
                    path: path.to_path_buf(),
                    part: WORD_BODY_PART,
                });
            }
            Err(source) => {
                return Err(ParseError::Archive {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        entry
            .read_to_string(&mut xml)
            .map_err(|source| ParseError::Io {
                path: path.to_path_buf(),
                source,
            })?;
    }

    paragraphs_from_document_xml(&xml).map_err(|source| ParseError::Xml {
        path: path.to_path_buf(),
        source,
    })
}

/// Collect paragraph text from a WordprocessingML body.
pub(crate) fn paragraphs_from_document_xml(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut paragraph_depth = 0usize;
    let mut table_depth = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) => match element.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:p" => {
                    paragraph_depth += 1;
                    if paragraph_depth == 1 {
                        current.clear();
                    }
                }
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(element) => {
                if paragraph_depth == 1 && table_depth == 0 {
                    match element.name().as_ref() {
                        b"w:tab" => current.push('\t'),
                        b"w:br" | b"w:cr" => current.push('\n'),
                        _ => {}
                    }
                } else if paragraph_depth == 0
                    && table_depth == 0
                    && element.name().as_ref() == b"w:p"
                {
                    paragraphs.push(String::new());
                }
            }
            Event::Text(text) => {
                if in_text && paragraph_depth == 1 && table_depth == 0 {
                    current.push_str(&text.unescape()?);
                }
            }
            Event::End(element) => match element.name().as_ref() {
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:p" => {
                    if paragraph_depth == 1 && table_depth == 0 {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    paragraph_depth = paragraph_depth.saturating_sub(1);
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// Extract the text layer of every page of a PDF, in page order.
///
/// The PDF library may panic on malformed input; callers run this on the blocking pool, where
/// a panic surfaces as a join error instead of tearing down the runtime.
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<String>, ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|error| ParseError::Pdf {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{inner}</w:body></w:document>"#
        )
    }

    #[test]
    fn collects_runs_per_paragraph() {
        let xml = body(
            r#"<w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p><w:p><w:r><w:t>Second</w:t><w:tab/><w:t>line</w:t></w:r></w:p>"#,
        );
        let paragraphs = paragraphs_from_document_xml(&xml).expect("parse");
        assert_eq!(paragraphs, vec!["Hello world", "Second\tline"]);
    }

    #[test]
    fn skips_table_paragraphs_and_keeps_empty_ones() {
        let xml = body(
            r#"<w:p><w:r><w:t>Intro</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p/><w:p><w:r><w:t>Outro</w:t></w:r></w:p>"#,
        );
        let paragraphs = paragraphs_from_document_xml(&xml).expect("parse");
        assert_eq!(paragraphs, vec!["Intro", "", "Outro"]);
    }

    #[test]
    fn unescapes_entities() {
        let xml = body(r#"<w:p><w:r><w:t>Q&amp;A &lt;draft&gt;</w:t></w:r></w:p>"#);
        let paragraphs = paragraphs_from_document_xml(&xml).expect("parse");
        assert_eq!(paragraphs, vec!["Q&A <draft>"]);
    }

    #[test]
    fn rejects_malformed_xml() {
        let xml = body(r#"<w:p><w:r><w:t>open</w:r></w:p>"#);
        assert!(paragraphs_from_document_xml(&xml).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = extract_docx_paragraphs(Path::new("/nonexistent/file.docx"))
            .expect_err("missing file");
        assert!(matches!(error, ParseError::Io { .. }));
    }

    #[test]
    fn non_zip_docx_is_an_archive_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip archive").expect("write");
        let error = extract_docx_paragraphs(&path).expect_err("broken docx");
        assert!(matches!(error, ParseError::Archive { .. }));
    }
}
