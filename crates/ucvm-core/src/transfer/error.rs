//! Error type for a single HTTP-to-file transfer.

use std::path::PathBuf;

/// Why a transfer failed. Every variant leaves the destination path untouched
/// and the `.downloading` temp file removed.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// URL did not parse or is not http/https.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Curl reported a transport error (DNS, connect, TLS, low-speed timeout, ...).
    #[error("transfer failed: {0}")]
    Curl(#[from] curl::Error),
    /// Server answered with a non-2xx status.
    #[error("GET {url} returned HTTP {code}")]
    Http { url: String, code: u32 },
    /// Body was fully copied but its SHA-256 does not match what the caller expected.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    /// Cancellation was requested while the transfer was running.
    #[error("download cancelled")]
    Aborted,
    /// `<dest>.downloading` already exists: another download is writing the
    /// same destination, or a crashed one left it behind.
    #[error("{} already exists; another download is writing this destination (remove it if stale)", path.display())]
    TempInUse { path: PathBuf },
    /// Local filesystem failure (mkdir, open, write, sync, rename).
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Reading the temp file back for verification failed.
    #[error("verify {}: {source:#}", path.display())]
    Verify {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl TransferError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// True when the failure was caused by a cancellation request.
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransferError::Aborted)
    }
}
