//! Background download engine.
//!
//! Each started download gets one tokio task wrapping a blocking curl
//! transfer. The set of running ids lives in memory; the persisted
//! [`DownloadState`](crate::store::DownloadState) mirrors it for status views
//! and survives restarts. There is no worker limit.
//!
//! Records left `downloading` by a previous process are not touched unless
//! [`DownloadEngine::reconcile_orphans`] is called.

mod error;
mod task;
mod worker;

pub use error::EngineError;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::store::{now_unix, DownloadRecord, DownloadStatus, Store};
use crate::transfer::TransferOptions;
use task::TaskRegistry;

/// Error message stored on records reconciled as orphans.
pub const INTERRUPTED: &str = "interrupted";

/// What to download and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub id: String,
    pub url: String,
    pub dest: PathBuf,
    /// Expected SHA-256 (hex, optionally `sha256:`-prefixed).
    pub sha256: Option<String>,
}

impl DownloadRequest {
    pub fn new(id: impl Into<String>, url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            dest: dest.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }
}

#[derive(Clone)]
pub struct DownloadEngine {
    tasks: Arc<TaskRegistry>,
    store: Arc<Store>,
    opts: TransferOptions,
}

impl DownloadEngine {
    pub fn new(store: Arc<Store>, opts: TransferOptions) -> Self {
        Self {
            tasks: Arc::new(TaskRegistry::default()),
            store,
            opts,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Start `req` in the background on the current tokio runtime.
    ///
    /// Fails with [`EngineError::AlreadyInProgress`] if the id is running.
    /// The initial `downloading` record is written by the worker, off the
    /// async threads; a failure to persist it is logged and the download
    /// still runs.
    pub fn start(&self, req: DownloadRequest) -> Result<(), EngineError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| EngineError::NoRuntime(req.id.clone()))?;
        let slot = self.tasks.register(&req.id)?;

        let record = DownloadRecord::started(&req.id, &req.url, req.dest.clone(), now_unix());
        runtime.spawn(worker::run_worker(
            Arc::clone(&self.store),
            self.opts.clone(),
            req,
            record,
            slot,
        ));
        Ok(())
    }

    /// Start a download without checksum verification.
    pub fn start_background_download(
        &self,
        id: &str,
        url: &str,
        dest: impl Into<PathBuf>,
    ) -> Result<(), EngineError> {
        self.start(DownloadRequest::new(id, url, dest))
    }

    /// Request cancellation and wait until the worker has finished.
    ///
    /// Waits without a timeout. On return the id is no longer active, its
    /// record is terminal and no temp file remains.
    pub async fn cancel_download(&self, id: &str) -> Result<(), EngineError> {
        let mut done = self
            .tasks
            .request_abort(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        tracing::info!(id, "cancelling download");
        // Err means the sender is gone, which only happens after completion.
        let _ = done.wait_for(|finished| *finished).await;
        Ok(())
    }

    pub fn is_download_active(&self, id: &str) -> bool {
        self.tasks.is_active(id)
    }

    /// True iff `id` was running and finished within `timeout`.
    pub async fn wait_for_download(&self, id: &str, timeout: Duration) -> bool {
        let Some(mut done) = self.tasks.completion(id) else {
            return false;
        };
        let waited = tokio::time::timeout(timeout, done.wait_for(|finished| *finished)).await;
        waited.is_ok()
    }

    /// Persisted records in `downloading` state, oldest first.
    ///
    /// Includes orphans from earlier processes; see [`Self::reconcile_orphans`].
    pub fn get_active_downloads(&self) -> Result<Vec<DownloadRecord>, EngineError> {
        let state = self
            .store
            .load_download_state()
            .map_err(EngineError::Store)?;
        Ok(state.active())
    }

    /// Every persisted record, oldest first.
    pub fn list_downloads(&self) -> Result<Vec<DownloadRecord>, EngineError> {
        let state = self
            .store
            .load_download_state()
            .map_err(EngineError::Store)?;
        let mut records: Vec<_> = state.downloads.into_values().collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Mark persisted `downloading` records with no running task in this
    /// engine as `error` / "interrupted". Returns the ids changed.
    pub fn reconcile_orphans(&self) -> Result<Vec<String>, EngineError> {
        let now = now_unix();
        let marked = self
            .store
            .update_download_state(|st| {
                let mut marked = Vec::new();
                for rec in st.downloads.values_mut() {
                    // Checked under the store lock: a task registers before
                    // its first record write.
                    if rec.status == DownloadStatus::Downloading && !self.tasks.is_active(&rec.id) {
                        rec.fail(INTERRUPTED, now);
                        marked.push(rec.id.clone());
                    }
                }
                marked
            })
            .map_err(EngineError::Store)?;
        if !marked.is_empty() {
            tracing::info!(count = marked.len(), "reconciled orphaned downloads");
        }
        Ok(marked)
    }
}
