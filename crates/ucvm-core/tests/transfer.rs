//! Integration tests: single GET into a destination file against a local server.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use common::http_server::{self, ServerOptions};
use tempfile::tempdir;
use ucvm_core::checksum;
use ucvm_core::transfer::{fetch_to_file, temp_path, ProgressSink, TransferError, TransferOptions};

const BODY: &[u8] = b"test image content";

fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

#[test]
fn downloads_body_and_removes_temp() {
    let server = http_server::start(BODY.to_vec());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("x.img");
    let abort = AtomicBool::new(false);

    let n = fetch_to_file(
        &server.url("x.img"),
        &dest,
        None,
        None,
        &abort,
        &TransferOptions::default(),
    )
    .expect("fetch");

    assert_eq!(n, 18);
    assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    assert!(!temp_path(&dest).exists());
    assert!(!dir.path().join("x.img.downloading").exists());
}

#[test]
fn creates_missing_parent_directories() {
    let server = http_server::start(BODY.to_vec());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("images").join("noble").join("x.img");
    let abort = AtomicBool::new(false);
    fetch_to_file(&server.url("x.img"), &dest, None, None, &abort, &TransferOptions::default())
        .expect("fetch");
    assert_eq!(std::fs::read(&dest).unwrap(), BODY);
}

#[test]
fn matching_checksum_completes() {
    let server = http_server::start(BODY.to_vec());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("x.img");
    let abort = AtomicBool::new(false);
    let expected = format!("sha256:{}", sha256_hex(BODY).to_uppercase());

    fetch_to_file(
        &server.url("x.img"),
        &dest,
        Some(&expected),
        None,
        &abort,
        &TransferOptions::default(),
    )
    .expect("fetch with checksum");

    assert_eq!(checksum::sha256_path(&dest).unwrap(), sha256_hex(BODY));
}

#[test]
fn checksum_mismatch_leaves_no_files() {
    let server = http_server::start(BODY.to_vec());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("x.img");
    let abort = AtomicBool::new(false);
    let zeros = "0".repeat(64);

    let err = fetch_to_file(
        &server.url("x.img"),
        &dest,
        Some(&zeros),
        None,
        &abort,
        &TransferOptions::default(),
    )
    .unwrap_err();

    match &err {
        TransferError::ChecksumMismatch { expected, actual } => {
            assert_eq!(expected, &zeros);
            assert_eq!(actual, &sha256_hex(BODY));
        }
        other => panic!("expected checksum mismatch, got {other}"),
    }
    assert!(err.to_string().contains("checksum mismatch"));
    assert!(!dest.exists());
    assert!(!temp_path(&dest).exists());
}

#[test]
fn http_error_status_is_reported() {
    let server = http_server::start_with_options(Vec::new(), ServerOptions::status(404, "Not Found"));
    let dir = tempdir().unwrap();
    let dest = dir.path().join("missing.img");
    let abort = AtomicBool::new(false);

    let err = fetch_to_file(
        &server.url("missing.img"),
        &dest,
        None,
        None,
        &abort,
        &TransferOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, TransferError::Http { code: 404, .. }), "got {err}");
    assert!(err.to_string().contains("HTTP 404"));
    assert!(!dest.exists());
    assert!(!temp_path(&dest).exists());
}

#[test]
fn existing_destination_replaced_only_on_success() {
    let server = http_server::start(BODY.to_vec());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("x.img");
    std::fs::write(&dest, b"old").unwrap();
    let abort = AtomicBool::new(false);

    let bad = "f".repeat(64);
    assert!(fetch_to_file(&server.url("x.img"), &dest, Some(&bad), None, &abort, &TransferOptions::default()).is_err());
    assert_eq!(std::fs::read(&dest).unwrap(), b"old");

    fetch_to_file(&server.url("x.img"), &dest, None, None, &abort, &TransferOptions::default())
        .expect("fetch");
    assert_eq!(std::fs::read(&dest).unwrap(), BODY);
}

#[test]
fn progress_reports_every_chunk_up_to_total() {
    let body: Vec<u8> = (0u8..=255).cycle().take(256 * 1024).collect();
    let server = http_server::start_with_options(
        body.clone(),
        ServerOptions::slow(16 * 1024, std::time::Duration::from_millis(2)),
    );
    let dir = tempdir().unwrap();
    let dest = dir.path().join("big.img");
    let abort = AtomicBool::new(false);
    let seen = Mutex::new(Vec::<(u64, u64)>::new());
    let sink = |downloaded: u64, total: u64| seen.lock().unwrap().push((downloaded, total));

    let n = fetch_to_file(
        &server.url("big.img"),
        &dest,
        None,
        Some(&sink as &dyn ProgressSink),
        &abort,
        &TransferOptions::default(),
    )
    .expect("fetch");

    let seen = seen.into_inner().unwrap();
    assert_eq!(n, body.len() as u64);
    assert!(seen.len() > 1, "expected several progress callbacks");
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0), "downloaded must grow");
    assert!(seen.iter().all(|&(_, total)| total == body.len() as u64));
    assert_eq!(seen.last().unwrap().0, body.len() as u64);
    assert_eq!(server.requests(), 1);
}

/// Cancel lands once every byte is on disk: nothing may be published.
fn abort_after_full_body(expected: Option<&str>) {
    let server = http_server::start(BODY.to_vec());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("x.img");
    let abort = AtomicBool::new(false);
    let sink = |downloaded: u64, total: u64| {
        if downloaded == total {
            abort.store(true, Ordering::Relaxed);
        }
    };

    let err = fetch_to_file(
        &server.url("x.img"),
        &dest,
        expected,
        Some(&sink as &dyn ProgressSink),
        &abort,
        &TransferOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, TransferError::Aborted), "got {err}");
    assert!(!dest.exists());
    assert!(!temp_path(&dest).exists());
}

#[test]
fn abort_after_last_byte_is_not_published() {
    abort_after_full_body(None);
}

#[test]
fn abort_after_last_byte_with_checksum_is_not_published() {
    let expected = sha256_hex(BODY);
    abort_after_full_body(Some(&expected));
}

#[test]
fn existing_temp_file_is_refused_and_kept() {
    let server = http_server::start(BODY.to_vec());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("x.img");
    std::fs::write(temp_path(&dest), b"someone else").unwrap();
    let abort = AtomicBool::new(false);

    let err = fetch_to_file(&server.url("x.img"), &dest, None, None, &abort, &TransferOptions::default())
        .unwrap_err();

    assert!(matches!(err, TransferError::TempInUse { .. }), "got {err}");
    assert!(err.to_string().contains("already exists"));
    assert_eq!(std::fs::read(temp_path(&dest)).unwrap(), b"someone else");
    assert!(!dest.exists());
    assert_eq!(server.requests(), 0);
}
