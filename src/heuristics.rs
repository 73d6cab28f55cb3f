//! Text/binary heuristics
//!
//! Used when no signature rule matched. Byte-order marks are checked first
//! and must decode cleanly; then a NUL byte near the start means binary;
//! otherwise the buffer is tested against progressively looser text
//! encodings.

use crate::types::{HEURISTIC_WINDOW, LONG_LINE_THRESHOLD, MIME_OCTET_STREAM, MatchKind, MatchResult};

const BOM_UTF32_LE: &[u8] = &[0xff, 0xfe, 0x00, 0x00];
const BOM_UTF32_BE: &[u8] = &[0x00, 0x00, 0xfe, 0xff];
const BOM_UTF16_LE: &[u8] = &[0xff, 0xfe];
const BOM_UTF16_BE: &[u8] = &[0xfe, 0xff];
const BOM_UTF8: &[u8] = &[0xef, 0xbb, 0xbf];

/// Text encoding detected for a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    /// ISO-8859 text: 7-bit text plus 0xA0..=0xFF
    Latin1,
    /// 7-bit text plus bytes anywhere in 0x80..=0xFF
    ExtendedAscii,
    Binary,
}

impl Encoding {
    /// Name used in descriptions, as in "ASCII text"
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "ASCII",
            Encoding::Utf8 => "UTF-8 Unicode",
            Encoding::Utf8Bom => "UTF-8 Unicode (with BOM)",
            Encoding::Utf16Le => "Little-endian UTF-16 Unicode",
            Encoding::Utf16Be => "Big-endian UTF-16 Unicode",
            Encoding::Utf32Le => "Little-endian UTF-32 Unicode",
            Encoding::Utf32Be => "Big-endian UTF-32 Unicode",
            Encoding::Latin1 => "ISO-8859",
            Encoding::ExtendedAscii => "Non-ISO extended-ASCII",
            Encoding::Binary => "binary",
        }
    }

    /// MIME charset parameter
    pub fn charset(self) -> &'static str {
        match self {
            Encoding::Ascii => "us-ascii",
            Encoding::Utf8 | Encoding::Utf8Bom => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Utf32Le => "utf-32le",
            Encoding::Utf32Be => "utf-32be",
            Encoding::Latin1 => "iso-8859-1",
            Encoding::ExtendedAscii => "unknown-8bit",
            Encoding::Binary => "binary",
        }
    }

    pub fn is_text(self) -> bool {
        self != Encoding::Binary
    }
}

/// Bytes that may appear in plain text: BEL through CR, ESC, and printable ASCII
fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 0x07..=0x0d | 0x1b | 0x20..=0x7e)
}

fn is_text_char(c: char) -> bool {
    match u8::try_from(u32::from(c)) {
        Ok(byte) if byte < 0x80 => is_text_byte(byte),
        _ => !c.is_control(),
    }
}

/// Detects the text encoding of `data`, or `Binary`
pub fn detect_encoding(data: &[u8]) -> Encoding {
    if let Some(encoding) = detect_bom(data) {
        return encoding;
    }

    let window = &data[..data.len().min(HEURISTIC_WINDOW)];
    if memchr::memchr(0, window).is_some() {
        return Encoding::Binary;
    }

    if data.iter().all(|b| is_text_byte(*b)) {
        Encoding::Ascii
    } else if is_utf8_text(data) {
        Encoding::Utf8
    } else if data.iter().all(|b| is_text_byte(*b) || *b >= 0xa0) {
        Encoding::Latin1
    } else if data.iter().all(|b| is_text_byte(*b) || *b >= 0x80) {
        Encoding::ExtendedAscii
    } else {
        Encoding::Binary
    }
}

fn detect_bom(data: &[u8]) -> Option<Encoding> {
    if let Some(body) = data.strip_prefix(BOM_UTF32_LE) {
        if decode_utf32(body, false).is_some() {
            return Some(Encoding::Utf32Le);
        }
    }
    if let Some(body) = data.strip_prefix(BOM_UTF32_BE) {
        if decode_utf32(body, true).is_some() {
            return Some(Encoding::Utf32Be);
        }
    }
    if let Some(body) = data.strip_prefix(BOM_UTF16_LE) {
        if decode_utf16(body, false).is_some() {
            return Some(Encoding::Utf16Le);
        }
    }
    if let Some(body) = data.strip_prefix(BOM_UTF16_BE) {
        if decode_utf16(body, true).is_some() {
            return Some(Encoding::Utf16Be);
        }
    }
    if let Some(body) = data.strip_prefix(BOM_UTF8) {
        if is_utf8_text(body) {
            return Some(Encoding::Utf8Bom);
        }
    }
    None
}

/// Valid UTF-8 made of text characters. A multi-byte sequence cut off by the
/// end of the buffer is tolerated, since the buffer may be a prefix.
fn is_utf8_text(data: &[u8]) -> bool {
    let valid = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(err) if err.error_len().is_none() => {
            match std::str::from_utf8(&data[..err.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    valid.chars().all(is_text_char)
}

/// Decodes UTF-16 text after the BOM; a trailing odd byte or a cut-off
/// surrogate pair is ignored.
fn decode_utf16(body: &[u8], big_endian: bool) -> Option<Vec<char>> {
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            let bytes = [pair[0], pair[1]];
            if big_endian {
                u16::from_be_bytes(bytes)
            } else {
                u16::from_le_bytes(bytes)
            }
        })
        .collect();

    let mut chars = Vec::with_capacity(units.len());
    let total = units.len();
    for (index, decoded) in char::decode_utf16(units).enumerate() {
        match decoded {
            Ok(c) if is_text_char(c) => chars.push(c),
            Err(_) if index + 1 == total => break,
            _ => return None,
        }
    }
    Some(chars)
}

fn decode_utf32(body: &[u8], big_endian: bool) -> Option<Vec<char>> {
    body.chunks_exact(4)
        .map(|quad| {
            let bytes = [quad[0], quad[1], quad[2], quad[3]];
            let code = if big_endian {
                u32::from_be_bytes(bytes)
            } else {
                u32::from_le_bytes(bytes)
            };
            char::from_u32(code).filter(|c| is_text_char(*c))
        })
        .collect()
}

/// Line and control-character statistics of a text
#[derive(Debug, Default, PartialEq, Eq)]
struct TextStats {
    crlf: usize,
    cr: usize,
    lf: usize,
    longest_line: usize,
    escapes: bool,
    overstriking: bool,
}

impl TextStats {
    fn gather(units: impl IntoIterator<Item = u32>) -> Self {
        let mut stats = TextStats::default();
        let mut line = 0usize;
        let mut pending_cr = false;

        for unit in units {
            if pending_cr {
                pending_cr = false;
                if unit == u32::from(b'\n') {
                    stats.crlf += 1;
                    continue;
                }
                stats.cr += 1;
            }
            match unit {
                0x0d => {
                    pending_cr = true;
                    stats.longest_line = stats.longest_line.max(line);
                    line = 0;
                }
                0x0a => {
                    stats.lf += 1;
                    stats.longest_line = stats.longest_line.max(line);
                    line = 0;
                }
                0x1b => {
                    stats.escapes = true;
                    line += 1;
                }
                0x08 => {
                    stats.overstriking = true;
                    line += 1;
                }
                _ => line += 1,
            }
        }
        if pending_cr {
            stats.cr += 1;
        }
        stats.longest_line = stats.longest_line.max(line);
        stats
    }

    fn annotations(&self) -> String {
        let mut out = String::new();
        if self.longest_line > LONG_LINE_THRESHOLD {
            out.push_str(", with very long lines");
        }

        let kinds: Vec<&str> = [("CRLF", self.crlf), ("CR", self.cr), ("LF", self.lf)]
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, _)| name)
            .collect();
        match kinds.as_slice() {
            [] => out.push_str(", with no line terminators"),
            ["LF"] => {}
            kinds => {
                out.push_str(", with ");
                out.push_str(&kinds.join(", "));
                out.push_str(" line terminators");
            }
        }

        if self.escapes {
            out.push_str(", with escape sequences");
        }
        if self.overstriking {
            out.push_str(", with overstriking");
        }
        out
    }
}

fn code_units(data: &[u8], encoding: Encoding) -> Vec<u32> {
    let decoded = match encoding {
        Encoding::Utf16Le => decode_utf16(&data[BOM_UTF16_LE.len()..], false),
        Encoding::Utf16Be => decode_utf16(&data[BOM_UTF16_BE.len()..], true),
        Encoding::Utf32Le => decode_utf32(&data[BOM_UTF32_LE.len()..], false),
        Encoding::Utf32Be => decode_utf32(&data[BOM_UTF32_BE.len()..], true),
        Encoding::Utf8Bom => return data[BOM_UTF8.len()..].iter().map(|b| u32::from(*b)).collect(),
        _ => return data.iter().map(|b| u32::from(*b)).collect(),
    };
    decoded
        .unwrap_or_default()
        .into_iter()
        .map(u32::from)
        .collect()
}

/// Classifies a buffer no signature matched. Never fails.
pub fn classify(data: &[u8]) -> MatchResult {
    if data.is_empty() {
        return MatchResult::empty().with_charset(Encoding::Binary.charset());
    }

    let encoding = detect_encoding(data);
    if !encoding.is_text() {
        return MatchResult::new(MatchKind::Binary, "binary data")
            .with_mime(MIME_OCTET_STREAM)
            .with_charset(encoding.charset());
    }

    let summary = format!("{} text", encoding.name());
    let stats = TextStats::gather(code_units(data, encoding));
    let description = format!("{summary}{}", stats.annotations());

    MatchResult::new(MatchKind::Text, description)
        .with_summary(summary)
        .with_mime("text/plain")
        .with_charset(encoding.charset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_stats_counts_terminators() {
        let stats = TextStats::gather(b"a\r\nb\rc\nd".iter().map(|b| u32::from(*b)));
        assert_eq!((stats.crlf, stats.cr, stats.lf), (1, 1, 1));
        assert_eq!(stats.annotations(), ", with CRLF, CR, LF line terminators");
    }

    #[test]
    fn test_trailing_cr_counts() {
        let stats = TextStats::gather(b"abc\r".iter().map(|b| u32::from(*b)));
        assert_eq!(stats.cr, 1);
        assert_eq!(stats.annotations(), ", with CR line terminators");
    }

    #[test]
    fn test_truncated_utf8_is_tolerated() {
        let mut data = "caf\u{e9} ".as_bytes().to_vec();
        data.extend_from_slice(&[0xe2, 0x82]);
        assert!(is_utf8_text(&data));
        assert!(!is_utf8_text(&[0x61, 0xff, 0x62]));
    }

    #[test]
    fn test_utf16_with_odd_tail() {
        assert!(decode_utf16(&[b'h', 0, b'i', 0, b'\n'], false).is_some());
        assert!(decode_utf16(&[0x01, 0x00], false).is_none());
    }
}
