//! Identification options
//!
//! One value carries every switch the sniffer, the formatter and the
//! capture layer consult, so the CLI builds it once and hands it around.

use crate::magic::SignatureStore;
use crate::types::MAX_PREFIX_LEN;

/// Environment variable naming the magic database(s) to load
pub const MAGIC_ENV: &str = "MAGIC";

/// Options for identifying and rendering inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Emit only the MIME string
    pub mime_only: bool,
    /// Suppress sub-descriptions
    pub brief: bool,
    /// Disable the heuristic fallback entirely
    pub raw: bool,
    /// Append the MIME string to the description
    pub with_mime: bool,
    /// Emit the known extensions instead of a description
    pub extension: bool,
    /// Follow symbolic links instead of reporting them
    pub dereference: bool,
    /// Override for the captured prefix length
    pub max_bytes: Option<usize>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mime_only(mut self, enabled: bool) -> Self {
        self.mime_only = enabled;
        self
    }

    pub fn with_brief(mut self, enabled: bool) -> Self {
        self.brief = enabled;
        self
    }

    pub fn with_raw(mut self, enabled: bool) -> Self {
        self.raw = enabled;
        self
    }

    pub fn with_mime_annotation(mut self, enabled: bool) -> Self {
        self.with_mime = enabled;
        self
    }

    pub fn with_extension(mut self, enabled: bool) -> Self {
        self.extension = enabled;
        self
    }

    pub fn with_dereference(mut self, enabled: bool) -> Self {
        self.dereference = enabled;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<usize>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Number of leading bytes to capture from each input
    pub fn capture_limit(&self, store: &SignatureStore) -> usize {
        match self.max_bytes {
            Some(limit) => limit.min(MAX_PREFIX_LEN),
            None => store.prefix_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_flags() {
        let options = Options::new()
            .with_brief(true)
            .with_raw(true)
            .with_max_bytes(Some(16));
        assert!(options.brief);
        assert!(options.raw);
        assert!(!options.mime_only);
        assert_eq!(options.max_bytes, Some(16));
    }

    #[test]
    fn test_capture_limit_is_capped() {
        let store = SignatureStore::parse("test", "0 string ABC abc\n").unwrap();
        let options = Options::new().with_max_bytes(Some(usize::MAX));
        assert_eq!(options.capture_limit(&store), MAX_PREFIX_LEN);
        assert_eq!(Options::new().capture_limit(&store), store.prefix_len());
    }
}
