//! Result formatter

use crate::config::Options;
use crate::types::MatchResult;

/// Placeholder printed in extension mode when no extension is known
pub const UNKNOWN_EXTENSION: &str = "???";

/// Renders a result the way the options ask for. Pure; no I/O.
pub fn format(result: &MatchResult, options: &Options) -> String {
    if options.extension {
        return if result.extensions.is_empty() {
            UNKNOWN_EXTENSION.to_string()
        } else {
            result.extensions.join("/")
        };
    }

    if options.mime_only {
        return result.mime_string();
    }

    let text = if options.brief && !result.summary.is_empty() {
        &result.summary
    } else {
        &result.description
    };

    let mut out = escape_unprintable(text);
    if options.with_mime {
        out.push_str("; ");
        out.push_str(&result.mime_string());
    }
    out
}

/// Control characters are shown as `\ooo` octal escapes
pub fn escape_unprintable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            let mut utf8 = [0u8; 4];
            out.push_str(&crate::sniffer::escape(c.encode_utf8(&mut utf8).as_bytes()));
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchKind;

    #[test]
    fn test_escape_unprintable() {
        assert_eq!(escape_unprintable("a\tb\u{7}"), "a\\011b\\007");
        assert_eq!(escape_unprintable("caf\u{e9}"), "caf\u{e9}");
    }

    #[test]
    fn test_extension_placeholder() {
        let result = MatchResult::new(MatchKind::Text, "ASCII text");
        let options = Options::new().with_extension(true);
        assert_eq!(format(&result, &options), UNKNOWN_EXTENSION);
    }
}
