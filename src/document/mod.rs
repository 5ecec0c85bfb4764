//! Document parsing: raw extraction, sanitization, and source detection.

pub mod extract;
pub mod parse;
pub mod sanitize;
pub mod types;

pub use parse::{
    DocumentParser, FileParser, PAGE_BREAK_PREFIX, PAGE_BREAK_SUFFIX, assemble_pdf, assemble_word,
    page_break_marker, parse_file,
};
pub use types::{Chunk, DocType, Document, ParseError, ParsedText};
