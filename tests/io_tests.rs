use std::fs;
use std::io::{self, Read};

use sift::io::special_file;
use sift::{
    IdentifyError, InputBuffer, MatchKind, Options, SignatureStore, Subject, format,
    identify_all, identify_batch, identify_reader, identify_subject,
};
use tempfile::{NamedTempFile, tempdir};

/// Reader that fails the test if asked for anything past `limit`
struct StrictReader {
    data: Vec<u8>,
    pos: usize,
    limit: usize,
}

impl Read for StrictReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        assert!(
            self.pos + buf.len() <= self.limit,
            "read past the capture limit: {} + {} > {}",
            self.pos,
            buf.len(),
            self.limit
        );
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn builtin() -> SignatureStore {
    SignatureStore::builtin().unwrap()
}

#[test]
fn test_capture_never_reads_past_limit() {
    let reader = StrictReader {
        data: vec![b'x'; 10_000],
        pos: 0,
        limit: 100,
    };
    let buffer = InputBuffer::capture(reader, 100).unwrap();
    assert_eq!(buffer.len(), 100);
    assert!(!buffer.is_complete());
}
#[test]
fn test_short_input_is_complete() {
    let buffer = InputBuffer::capture(&b"tiny"[..], 100).unwrap();
    assert_eq!(buffer.as_bytes(), b"tiny");
    assert!(buffer.is_complete());
}
#[test]
fn test_identify_reader_honours_max_bytes() {
    let store = SignatureStore::parse("test", "-4 string TAIL tail\n").unwrap();
    let data = b"some leading textTAIL";

    let whole = identify_reader(&data[..], &store, &Options::default()).unwrap();
    assert_eq!(whole.description, "tail");

    let options = Options::new().with_max_bytes(Some(8));
    let cut = identify_reader(&data[..], &store, &options).unwrap();
    assert_eq!(cut.description, "ASCII text, with no line terminators");
}
#[test]
fn test_identify_regular_file() {
    let temp = NamedTempFile::new().unwrap();
    fs::write(temp.path(), b"%PDF-1.4\n").unwrap();
    let subject = Subject::from(temp.path().to_path_buf());
    let result = identify_subject(&subject, &builtin(), &Options::default()).unwrap();
    assert_eq!(result.description, "PDF document, version 1.4");
}
#[test]
fn test_empty_file() {
    let temp = NamedTempFile::new().unwrap();
    let subject = Subject::from(temp.path().to_path_buf());
    let result = identify_subject(&subject, &builtin(), &Options::default()).unwrap();
    assert_eq!(result.kind, MatchKind::Empty);
}
#[test]
fn test_directory_is_special() {
    let dir = tempdir().unwrap();
    let subject = Subject::from(dir.path().to_path_buf());
    let result = identify_subject(&subject, &builtin(), &Options::default()).unwrap();
    assert_eq!(result.kind, MatchKind::Special);
    assert_eq!(result.description, "directory");
    let options = Options::new().with_mime_only(true);
    assert_eq!(format(&result, &options), "inode/directory");
}
#[test]
fn test_regular_file_is_not_special() {
    let temp = NamedTempFile::new().unwrap();
    assert!(special_file(temp.path(), false).unwrap().is_none());
}
#[cfg(unix)]
#[test]
fn test_symlink_reported_unless_dereferenced() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("target.pdf");
    let link = dir.path().join("link");
    fs::write(&target, b"%PDF-1.5\n").unwrap();
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let subject = Subject::from(link.clone());
    let store = builtin();
    let plain = identify_subject(&subject, &store, &Options::default()).unwrap();
    assert_eq!(plain.description, format!("symbolic link to {}", target.display()));
    assert_eq!(plain.mime_string(), "inode/symlink");

    let options = Options::new().with_dereference(true);
    let followed = identify_subject(&subject, &store, &options).unwrap();
    assert_eq!(followed.description, "PDF document, version 1.5");
}
#[cfg(unix)]
#[test]
fn test_broken_symlink() {
    let dir = tempdir().unwrap();
    let link = dir.path().join("dangling");
    std::os::unix::fs::symlink("/nonexistent/sift-target", &link).unwrap();

    let options = Options::new().with_dereference(true);
    let result = identify_subject(&Subject::from(link), &builtin(), &options).unwrap();
    assert_eq!(
        result.description,
        "broken symbolic link to /nonexistent/sift-target"
    );
}
#[test]
fn test_missing_file_is_open_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.bin");
    let err = identify_subject(&Subject::from(missing.clone()), &builtin(), &Options::default())
        .unwrap_err();
    assert!(matches!(err, IdentifyError::Open { .. }));
    assert_eq!(err.name(), missing.display().to_string());
}
#[test]
fn test_batch_keeps_order_and_continues_after_errors() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("a.txt");
    let second = dir.path().join("b.pdf");
    fs::write(&first, b"hello\n").unwrap();
    fs::write(&second, b"%PDF-1.7\n").unwrap();

    let subjects = vec![
        Subject::from(first),
        Subject::from(dir.path().join("missing")),
        Subject::from(second),
    ];
    let reports = identify_all(&subjects, &builtin(), &Options::default());

    assert_eq!(reports.len(), 3);
    assert!(reports[0].is_ok());
    assert!(!reports[1].is_ok());
    assert!(reports[2].is_ok());
    assert!(reports[1].name.ends_with("missing"));
    let last = reports[2].outcome.as_ref().unwrap();
    assert_eq!(last.description, "PDF document, version 1.7");
}

#[test]
fn test_repeated_stdin_shares_one_capture() {
    let subjects = vec![Subject::Stdin, Subject::Stdin, Subject::Stdin];
    let stdin = io::Cursor::new(b"%PDF-1.4\n".to_vec());
    let reports = identify_batch(&subjects, stdin, &builtin(), &Options::default());

    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert_eq!(report.name, "/dev/stdin");
        let result = report.outcome.as_ref().unwrap();
        assert_eq!(result.description, "PDF document, version 1.4");
    }
}

#[test]
fn test_stdin_subject_name() {
    assert_eq!(Subject::parse("-").display_name(), "/dev/stdin");
    assert_eq!(Subject::parse("-").to_string(), "/dev/stdin");
}
