use std::env;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub mod commands;

/// Absolute form of a `--root` argument. Paths that do not exist yet are
/// joined onto the working directory instead of canonicalized.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Project name derived from the root directory, or `unnamed-project` for `/`.
pub fn infer_project_name(root: &Path) -> String {
    root.file_name().and_then(|os_str| os_str.to_str()).unwrap_or("unnamed-project").to_string()
}

/// Infer the binary name recorded for a run: the file name of the binary if
/// one was given, otherwise the snapshot's file stem.
pub fn infer_binary_name(binary: Option<&Path>, snapshot: &Path) -> String {
    binary
        .and_then(|path| path.file_name())
        .or_else(|| snapshot.file_stem())
        .and_then(|os_str| os_str.to_str())
        .unwrap_or("unnamed-binary")
        .to_string()
}

/// Hex SHA-256 of a binary, recorded with each run.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open binary for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read binary for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}

/// Parse a number given either in decimal or as `0x`-prefixed hex.
pub fn parse_number(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|err| format!("invalid number '{value}': {err}"))
}
