use std::fs;
use std::path::Path;

use string_slicer::{
    canonicalize_or_current, infer_binary_name, infer_project_name, parse_number, sha256_file,
};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(canonicalize_or_current(".").expect("canonicalize"), cwd);
}

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let nested = tmp.path().join("nested");
    fs::create_dir_all(&nested).expect("create nested");

    let result = canonicalize_or_current(nested.to_str().expect("utf8 path")).expect("canon");
    assert_eq!(result, nested.canonicalize().expect("canonicalize nested"));
}

#[test]
fn canonicalize_or_current_joins_missing_relative_path() {
    let cwd = std::env::current_dir().expect("cwd");
    let result = canonicalize_or_current("does-not-exist-yet").expect("join");
    assert_eq!(result, cwd.join("does-not-exist-yet"));
}

#[test]
fn infer_project_name_uses_last_component() {
    assert_eq!(infer_project_name(Path::new("/work/game-re")), "game-re");
    assert_eq!(infer_project_name(Path::new("/")), "unnamed-project");
}

#[test]
fn infer_binary_name_prefers_binary_then_snapshot_stem() {
    let snapshot = Path::new("/tmp/libgame.snapshot.json");
    assert_eq!(infer_binary_name(Some(Path::new("/bin/libgame.so")), snapshot), "libgame.so");
    assert_eq!(infer_binary_name(None, snapshot), "libgame.snapshot");
}

#[test]
fn sha256_file_matches_known_digest() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("data.bin");
    fs::write(&path, b"abc").expect("write");
    assert_eq!(
        sha256_file(&path).expect("hash"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert!(sha256_file(&tmp.path().join("missing.bin")).is_err());
}

#[test]
fn parse_number_accepts_decimal_and_hex() {
    assert_eq!(parse_number("4096"), Ok(4096));
    assert_eq!(parse_number("0x1000"), Ok(0x1000));
    assert_eq!(parse_number("0X20"), Ok(0x20));
    assert!(parse_number("0xZZ").is_err());
    assert!(parse_number("ten").is_err());
}
