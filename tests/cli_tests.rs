//! CLI integration tests for the identify binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn identify_bin() -> String {
    env!("CARGO_BIN_EXE_identify").to_string()
}

fn run_identify(args: &[&str]) -> Output {
    Command::new(identify_bin())
        .args(args)
        .env_remove("MAGIC")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute identify")
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_help() {
    let output = run_identify(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--mime"));
    assert!(stdout.contains("--magic-file"));
}

#[test]
fn test_describes_files_with_names() {
    let dir = tempdir().unwrap();
    let text = dir.path().join("notes.txt");
    let pdf = dir.path().join("doc.pdf");
    fs::write(&text, b"hello\n").unwrap();
    fs::write(&pdf, b"%PDF-1.7\n").unwrap();

    let output = run_identify(&[&path_arg(&text), &path_arg(&pdf)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(&format!("{}:", text.display())));
    assert!(lines[0].ends_with(" ASCII text"));
    assert!(lines[1].ends_with(" PDF document, version 1.7"));
}

#[test]
fn test_mime_and_brief_flags() {
    let dir = tempdir().unwrap();
    let pdf = dir.path().join("doc.pdf");
    fs::write(&pdf, b"%PDF-1.7\n").unwrap();
    let name = path_arg(&pdf);

    let output = run_identify(&["-N", "-b", "-i", &name]);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim_end(),
        "application/pdf; charset=us-ascii"
    );

    let output = run_identify(&["-N", "-b", &name]);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim_end(), "PDF document");
}

#[test]
fn test_custom_magic_file() {
    let dir = tempdir().unwrap();
    let magic = dir.path().join("custom.magic");
    let input = dir.path().join("input.bin");
    fs::write(&magic, "0 string SIFT sift test file\n!:mime application/x-sift\n").unwrap();
    fs::write(&input, b"SIFT\x01\x02").unwrap();

    let output = run_identify(&["-N", "-m", &path_arg(&magic), "--with-mime", &path_arg(&input)]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim_end(),
        "sift test file; application/x-sift; charset=binary"
    );
}

#[test]
fn test_bad_magic_file_exits_with_two() {
    let dir = tempdir().unwrap();
    let magic = dir.path().join("broken.magic");
    fs::write(&magic, "0 wibble 1 nope\n").unwrap();

    let output = run_identify(&["-m", &path_arg(&magic), "whatever"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken.magic:1"));
}

#[test]
fn test_unreadable_input_exits_with_one() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.txt");
    fs::write(&good, b"fine\n").unwrap();
    let missing = dir.path().join("missing");

    let output = run_identify(&[&path_arg(&good), &path_arg(&missing)]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ASCII text"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing"));
}

#[test]
fn test_no_inputs_is_usage_error() {
    let output = run_identify(&[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_files_from_list() {
    let dir = tempdir().unwrap();
    let pdf = dir.path().join("doc.pdf");
    let list = dir.path().join("list.txt");
    fs::write(&pdf, b"%PDF-1.3\n").unwrap();
    fs::write(&list, format!("{}\n\n", pdf.display())).unwrap();

    let output = run_identify(&["-N", "-f", &path_arg(&list)]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim_end(),
        "PDF document, version 1.3"
    );
}

#[test]
fn test_list_rules() {
    let output = run_identify(&["--list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().all(|line| line.starts_with("Strength = ")));
    assert!(stdout.contains("PNG image data [image/png]"));
}

#[test]
fn test_json_output() {
    let dir = tempdir().unwrap();
    let pdf = dir.path().join("doc.pdf");
    fs::write(&pdf, b"%PDF-1.7\n").unwrap();

    let output = run_identify(&["--json", &path_arg(&pdf), &path_arg(&dir.path().join("gone"))]);
    assert_eq!(output.status.code(), Some(1));
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entries[0]["output"], "PDF document, version 1.7");
    assert_eq!(entries[0]["result"]["mime"], "application/pdf");
    assert!(entries[1]["error"].as_str().unwrap().contains("gone"));
}
