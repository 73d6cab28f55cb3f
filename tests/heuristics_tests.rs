use sift::{Encoding, MatchKind, classify, detect_encoding};

#[test]
fn test_plain_ascii() {
    let result = classify(b"hello world\n");
    assert_eq!(result.kind, MatchKind::Text);
    assert_eq!(result.description, "ASCII text");
    assert_eq!(result.summary, "ASCII text");
    assert_eq!(result.mime_string(), "text/plain; charset=us-ascii");
}
#[test]
fn test_no_line_terminators() {
    assert_eq!(
        classify(b"hello").description,
        "ASCII text, with no line terminators"
    );
}
#[test]
fn test_crlf_terminators() {
    assert_eq!(
        classify(b"one\r\ntwo\r\n").description,
        "ASCII text, with CRLF line terminators"
    );
}
#[test]
fn test_very_long_lines() {
    let mut text = vec![b'a'; 400];
    text.push(b'\n');
    assert_eq!(classify(&text).description, "ASCII text, with very long lines");
}
#[test]
fn test_annotations_keep_their_order() {
    let mut text = vec![b'a'; 301];
    text.extend_from_slice(b"\x1b[1m\r");
    assert_eq!(
        classify(&text).description,
        "ASCII text, with very long lines, with CR line terminators, with escape sequences"
    );
}
#[test]
fn test_escape_sequences_and_overstriking() {
    assert_eq!(
        classify(b"\x1b[1mbold\x1b[0m\n").description,
        "ASCII text, with escape sequences"
    );
    assert_eq!(
        classify(b"_\x08a_\x08b\n").description,
        "ASCII text, with overstriking"
    );
}
#[test]
fn test_utf8_text() {
    let result = classify("caf\u{e9} cr\u{e8}me\n".as_bytes());
    assert_eq!(result.description, "UTF-8 Unicode text");
    assert_eq!(result.charset, Some("utf-8"));
}
#[test]
fn test_utf8_bom() {
    let mut text = vec![0xef, 0xbb, 0xbf];
    text.extend_from_slice(b"hello\n");
    assert_eq!(detect_encoding(&text), Encoding::Utf8Bom);
    assert_eq!(classify(&text).description, "UTF-8 Unicode (with BOM) text");
}
#[test]
fn test_utf16_bom_wins_over_nul_check() {
    let text = [0xff, 0xfe, b'h', 0, b'i', 0, b'\n', 0];
    assert_eq!(detect_encoding(&text), Encoding::Utf16Le);
    let result = classify(&text);
    assert_eq!(result.description, "Little-endian UTF-16 Unicode text");
    assert_eq!(result.charset, Some("utf-16le"));

    let big = [0xfe, 0xff, 0, b'h', 0, b'i'];
    assert_eq!(
        classify(&big).description,
        "Big-endian UTF-16 Unicode text, with no line terminators"
    );
}
#[test]
fn test_utf32_checked_before_utf16() {
    let text = [0xff, 0xfe, 0, 0, b'a', 0, 0, 0, b'\n', 0, 0, 0];
    assert_eq!(detect_encoding(&text), Encoding::Utf32Le);
}
#[test]
fn test_invalid_bom_body_is_binary() {
    let data = [0xff, 0xfe, 0x01, 0x00, 0x02, 0x00];
    assert_eq!(detect_encoding(&data), Encoding::Binary);
}
#[test]
fn test_latin1_and_extended_ascii() {
    let latin = classify(b"caf\xe9\n");
    assert_eq!(latin.description, "ISO-8859 text");
    assert_eq!(latin.charset, Some("iso-8859-1"));

    let extended = classify(b"abc\x85\n");
    assert_eq!(extended.description, "Non-ISO extended-ASCII text");
    assert_eq!(extended.charset, Some("unknown-8bit"));
}
#[test]
fn test_nul_means_binary() {
    let result = classify(b"abc\0def");
    assert_eq!(result.kind, MatchKind::Binary);
    assert_eq!(result.description, "binary data");
    assert_eq!(result.mime_string(), "application/octet-stream; charset=binary");
}
#[test]
fn test_nul_only_checked_in_window() {
    let mut text = b"line one\n".repeat(1000);
    text.truncate(8000);
    assert_eq!(detect_encoding(&text), Encoding::Ascii);
    text.insert(7999, 0);
    assert_eq!(detect_encoding(&text), Encoding::Binary);
}
#[test]
fn test_control_bytes_are_binary() {
    assert_eq!(classify(&[0x01, 0x02, 0x03]).description, "binary data");
}
#[test]
fn test_empty_buffer() {
    let result = classify(b"");
    assert_eq!(result.kind, MatchKind::Empty);
    assert_eq!(result.description, "empty");
}
