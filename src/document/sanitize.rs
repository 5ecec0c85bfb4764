//! Character filtering and whitespace normalization for extracted text.

/// Punctuation retained by [`sanitize_line`].
const ALLOWED_PUNCTUATION: [char; 7] = ['.', ',', '!', '?', '-', '(', ')'];

/// Whether `c` survives sanitization: ASCII letters and digits, Hangul syllables, whitespace and
/// a small punctuation set.
pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || ('\u{AC00}'..='\u{D7A3}').contains(&c)
        || c.is_whitespace()
        || ALLOWED_PUNCTUATION.contains(&c)
}

/// Collapse every whitespace run into a single space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop disallowed characters, then collapse whitespace.
///
/// Filtering happens first so that removing a symbol between two spaces cannot leave a doubled
/// space behind.
pub fn sanitize_line(text: &str) -> String {
    let filtered: String = text.chars().filter(|c| is_allowed_char(*c)).collect();
    collapse_whitespace(&filtered)
}

/// Whether a normalized line names a web source.
pub fn is_url(line: &str) -> bool {
    line.starts_with("http://") || line.starts_with("https://")
}
