//! Single HTTP GET to a destination file.
//!
//! Streams the body into `<dest>.downloading`, optionally verifies SHA-256,
//! then renames onto `dest`. The destination either does not exist or holds
//! the complete, verified content. Nothing here retries; callers decide.

mod error;
mod headers;
mod progress;
mod temp;

pub use error::TransferError;
pub use progress::{ProgressSink, ProgressStats};
pub use temp::{temp_path, TEMP_SUFFIX};

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::checksum;
use headers::ResponseHeaders;
use progress::CountingWriter;
use temp::TempFile;

/// Curl knobs for a transfer (built from `[transfer]` in config.toml).
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub connect_timeout: Duration,
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub max_redirections: u32,
    pub user_agent: String,
}

impl Default for TransferOptions {
    fn default() -> Self {
        crate::config::TransferConfig::default().to_options()
    }
}

/// Reject anything curl should not be handed (file://, ftp://, garbage).
pub fn validate_url(raw: &str) -> Result<url::Url, TransferError> {
    let invalid = |reason: String| TransferError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {:?}", other))),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(parsed)
}

/// Download `url` to `dest`.
///
/// `progress` is notified after every chunk written. `abort` is honoured up to
/// the final rename: during the GET through curl's callbacks, then between
/// hashing steps and before publishing. An aborted transfer removes the temp
/// file and returns `TransferError::Aborted`. Returns the number of body
/// bytes written.
pub fn fetch_to_file(
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
    progress: Option<&dyn ProgressSink>,
    abort: &AtomicBool,
    opts: &TransferOptions,
) -> Result<u64, TransferError> {
    validate_url(url)?;
    let expected = expected_sha256.and_then(checksum::normalize_sha256);

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TransferError::io("create dir", parent, e))?;
    }

    let mut temp = TempFile::create(dest)?;
    tracing::debug!(url, temp = %temp.path().display(), "starting transfer");

    let written = perform_get(url, &mut temp, progress, abort, opts)?;
    temp.sync()?;
    bail_if_aborted(url, abort)?;

    if let Some(expected) = expected {
        let hashed = checksum::sha256_path_unless(temp.path(), abort).map_err(|e| {
            TransferError::Verify {
                path: temp.path().to_path_buf(),
                source: e,
            }
        })?;
        let Some(actual) = hashed else {
            tracing::info!(url, "transfer aborted during verification");
            return Err(TransferError::Aborted);
        };
        if actual != expected {
            tracing::warn!(url, %expected, %actual, "checksum mismatch, discarding download");
            return Err(TransferError::ChecksumMismatch { expected, actual });
        }
        tracing::debug!(url, "checksum verified");
    }

    // Last chance: a cancel seen after this point loses to the rename.
    bail_if_aborted(url, abort)?;
    temp.persist(dest)?;
    tracing::info!(url, dest = %dest.display(), bytes = written, "transfer complete");
    Ok(written)
}

fn bail_if_aborted(url: &str, abort: &AtomicBool) -> Result<(), TransferError> {
    if abort.load(Ordering::Relaxed) {
        tracing::info!(url, "transfer aborted before publishing");
        return Err(TransferError::Aborted);
    }
    Ok(())
}

/// Runs the curl GET, writing the body into `temp`.
fn perform_get(
    url: &str,
    temp: &mut TempFile,
    progress: Option<&dyn ProgressSink>,
    abort: &AtomicBool,
    opts: &TransferOptions,
) -> Result<u64, TransferError> {
    let temp_path = temp.path().to_path_buf();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(opts.max_redirections)?;
    easy.useragent(&opts.user_agent)?;
    easy.connect_timeout(opts.connect_timeout)?;
    // Prefer low-speed timeout over a wall-clock one: ISOs on slow mirrors take a while.
    easy.low_speed_limit(opts.low_speed_limit)?;
    easy.low_speed_time(opts.low_speed_time)?;
    // 4xx/5xx fail before any body is written to the temp file.
    easy.fail_on_error(true)?;
    // Enables the progress callback, which lets an idle transfer notice `abort`.
    easy.progress(true)?;

    let headers = ResponseHeaders::default();
    let mut writer = CountingWriter::new(temp.writer()?, progress);
    let mut write_failure: Option<std::io::Error> = None;

    let outcome = {
        let mut transfer = easy.transfer();
        transfer.header_function(|line| {
            headers.observe(line);
            true
        })?;
        transfer.write_function(|data| {
            if abort.load(Ordering::Relaxed) {
                return Ok(0);
            }
            match writer.write_chunk(data, headers.total()) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    write_failure = Some(e);
                    Ok(0)
                }
            }
        })?;
        transfer.progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))?;
        transfer.perform()
    };

    if let Err(e) = outcome {
        if abort.load(Ordering::Relaxed) {
            tracing::info!(url, "transfer aborted");
            return Err(TransferError::Aborted);
        }
        if let Some(io_err) = write_failure.take() {
            return Err(TransferError::io("write", temp_path, io_err));
        }
        if e.is_http_returned_error() {
            let code = easy.response_code().unwrap_or(0);
            return Err(TransferError::Http {
                url: url.to_string(),
                code,
            });
        }
        return Err(TransferError::Curl(e));
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http {
            url: url.to_string(),
            code,
        });
    }

    Ok(writer.written())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_accepts_http_and_https() {
        assert!(validate_url("http://cloud-images.ubuntu.com/noble/current/x.img").is_ok());
        assert!(validate_url("https://releases.ubuntu.com/24.04/x.iso").is_ok());
    }

    #[test]
    fn validate_url_rejects_other_schemes() {
        let err = validate_url("file:///etc/passwd").unwrap_err();
        assert!(matches!(err, TransferError::InvalidUrl { .. }));
        assert!(validate_url("ftp://example.com/x").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn invalid_url_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.img");
        let abort = AtomicBool::new(false);
        let err = fetch_to_file(
            "gopher://example.com/x",
            &dest,
            None,
            None,
            &abort,
            &TransferOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::InvalidUrl { .. }));
        assert!(!dest.exists());
        assert!(!temp_path(&dest).exists());
    }

    #[test]
    fn pre_set_abort_removes_temp() {
        // Nothing listens on port 9 normally; either the abort or the connect
        // failure ends the transfer, and neither may leave files behind.
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("x.img");
        let abort = AtomicBool::new(true);
        let res = fetch_to_file(
            "http://127.0.0.1:9/x.img",
            &dest,
            None,
            None,
            &abort,
            &TransferOptions::default(),
        );
        assert!(res.is_err());
        assert!(!dest.exists());
        assert!(!temp_path(&dest).exists());
        assert!(dir.path().join("nested").is_dir());
    }
}
