//! SHA-256 helpers for verifying downloaded images.
//!
//! Verification runs over the finished temp file rather than inline with the
//! write path, so a mismatch can be reported with both digests.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read size per hashing step; `abort` is checked between steps.
const CHUNK: usize = 1024 * 1024;

/// SHA-256 of the file at `path` as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    let never = AtomicBool::new(false);
    sha256_path_unless(path, &never)?
        .with_context(|| format!("hashing {} stopped early", path.display()))
}

/// Like [`sha256_path`], but gives up as soon as `abort` is set.
/// Returns `Ok(None)` when it gave up.
pub fn sha256_path_unless(path: &Path, abort: &AtomicBool) -> Result<Option<String>> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        if abort.load(Ordering::Relaxed) {
            return Ok(None);
        }
        match file.read(&mut buf) {
            Ok(0) => return Ok(Some(hex::encode(hasher.finalize()))),
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        }
    }
}

/// Normalize a user-supplied digest: trims whitespace, strips an optional
/// `sha256:` prefix and lowercases. Returns None when nothing is left.
pub fn normalize_sha256(expected: &str) -> Option<String> {
    let trimmed = expected.trim();
    let bare = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256:") => &trimmed[7..],
        _ => trimmed,
    };
    let bare = bare.trim();
    if bare.is_empty() {
        None
    } else {
        Some(bare.to_ascii_lowercase())
    }
}

/// True if `s` looks like a SHA-256 hex digest (64 hex chars).
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
