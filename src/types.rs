use serde::Serialize;

const KB: usize = 1024;
const MB: usize = KB * 1024;

/// Bytes inspected for a NUL before a buffer is declared binary.
pub const HEURISTIC_WINDOW: usize = 8000;
/// Extra bytes captured past the deepest offset any rule references.
pub const PREFIX_SAFETY_MARGIN: usize = 64;
/// Hard ceiling on the captured prefix, whatever the database asks for.
pub const MAX_PREFIX_LEN: usize = MB;
/// Nesting limit for rule evaluation, `use` included.
pub const MAX_RECURSION: usize = 50;
/// Longest string value read for `x`, `<` and `>` string tests.
pub const STRING_MAX: usize = 128;
/// Default window for `search` without an explicit range.
pub const SEARCH_DEFAULT_RANGE: usize = 4 * KB;
/// Default window for `regex` without an explicit range.
pub const REGEX_DEFAULT_RANGE: usize = 8 * KB;
/// Text lines longer than this get the "very long lines" annotation.
pub const LONG_LINE_THRESHOLD: usize = 300;

pub const MIME_OCTET_STREAM: &str = "application/octet-stream";
pub const MIME_EMPTY: &str = "inode/x-empty";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Zero-length input
    Empty,
    /// A signature rule matched
    Signature,
    /// Heuristic fallback recognised text
    Text,
    /// Heuristic fallback found binary content
    Binary,
    /// Nothing matched and the fallback was disabled
    Data,
    /// Not a regular file (directory, fifo, device, link)
    Special,
}

/// Outcome of identifying one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub kind: MatchKind,
    /// Full description, sub-descriptions included
    pub description: String,
    /// Top-level description only
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    pub strength: u32,
    /// Largest end offset touched by a matching rule
    pub consumed: usize,
}

impl MatchResult {
    pub fn new(kind: MatchKind, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            kind,
            summary: description.clone(),
            description,
            mime: None,
            charset: None,
            extensions: Vec::new(),
            strength: 0,
            consumed: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(MatchKind::Empty, "empty").with_mime(MIME_EMPTY)
    }

    pub fn data() -> Self {
        Self::new(MatchKind::Data, "data").with_mime(MIME_OCTET_STREAM)
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_charset(mut self, charset: &'static str) -> Self {
        self.charset = Some(charset);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// MIME type, falling back to `application/octet-stream`
    pub fn mime_type(&self) -> &str {
        self.mime.as_deref().unwrap_or(MIME_OCTET_STREAM)
    }

    /// MIME type with the charset parameter when one is known
    pub fn mime_string(&self) -> String {
        match self.charset {
            Some(charset) if !self.mime_type().starts_with("inode/") => {
                format!("{}; charset={}", self.mime_type(), charset)
            }
            _ => self.mime_type().to_string(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.kind == MatchKind::Signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_string_adds_charset() {
        let result = MatchResult::new(MatchKind::Text, "ASCII text")
            .with_mime("text/plain")
            .with_charset("us-ascii");
        assert_eq!(result.mime_string(), "text/plain; charset=us-ascii");
    }

    #[test]
    fn test_mime_string_skips_charset_for_inodes() {
        let result = MatchResult::empty().with_charset("binary");
        assert_eq!(result.mime_string(), "inode/x-empty");
    }

    #[test]
    fn test_missing_mime_defaults_to_octet_stream() {
        let result = MatchResult::new(MatchKind::Signature, "thing");
        assert_eq!(result.mime_type(), MIME_OCTET_STREAM);
    }
}
