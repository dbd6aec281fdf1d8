//! Errors returned by [`DownloadEngine`](super::DownloadEngine) operations.

/// Engine-level failures. Transfer failures never surface here: inside a
/// worker they become the record's `error` status.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("download already in progress: {0}")]
    AlreadyInProgress(String),
    #[error("download not found: {0}")]
    NotFound(String),
    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime to run download {0}")]
    NoRuntime(String),
    #[error("download state")]
    Store(#[source] anyhow::Error),
    #[error("download worker stopped unexpectedly: {0}")]
    Join(#[from] tokio::task::JoinError),
}
