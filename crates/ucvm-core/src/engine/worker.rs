//! Per-download worker: runs the blocking transfer and keeps the persisted
//! record in step with it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::store::{now_unix, DownloadRecord, DownloadState, Store};
use crate::transfer::{self, ProgressSink, TransferOptions};

use super::task::TaskSlot;
use super::{DownloadRequest, EngineError};

/// Writes a snapshot of the record on every progress notification.
///
/// Persistence failures never stop the transfer; they are counted and
/// reported once when the worker finishes.
pub(super) struct RecordProgress {
    store: Arc<Store>,
    template: DownloadRecord,
    failures: AtomicU64,
}

impl RecordProgress {
    pub(super) fn new(store: Arc<Store>, template: DownloadRecord) -> Self {
        Self {
            store,
            template,
            failures: AtomicU64::new(0),
        }
    }

    pub(super) fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn record<'a>(&self, state: &'a mut DownloadState) -> &'a mut DownloadRecord {
        state
            .downloads
            .entry(self.template.id.clone())
            .or_insert_with(|| self.template.clone())
    }

    /// Write the initial `downloading` record, replacing any earlier one for
    /// this id. A failure is logged; progress writes recreate the record.
    fn begin(&self) -> bool {
        let res = self.store.update_download_state(|st| {
            st.downloads.insert(self.template.id.clone(), self.template.clone());
        });
        match res {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id = %self.template.id, "initial download record not saved: {:#}", e);
                false
            }
        }
    }

    /// Write the terminal record. Returns false if the write failed.
    fn finish(&self, outcome: &Result<u64, String>) -> bool {
        let now = now_unix();
        let res = self.store.update_download_state(|st| {
            let rec = self.record(st);
            match outcome {
                Ok(bytes) => rec.complete(*bytes, now),
                Err(msg) => rec.fail(msg.clone(), now),
            }
        });
        match res {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id = %self.template.id, "final download record not saved: {:#}", e);
                false
            }
        }
    }
}

impl ProgressSink for RecordProgress {
    fn on_progress(&self, downloaded: u64, total: u64) {
        let res = self.store.update_download_state(|st| {
            let rec = self.record(st);
            rec.downloaded = downloaded;
            rec.total_bytes = total;
        });
        if let Err(e) = res {
            if self.failures.fetch_add(1, Ordering::Relaxed) == 0 {
                tracing::warn!(id = %self.template.id, "durable progress update failed: {:#}", e);
            }
        }
    }
}

/// Runs one download to its terminal state, then releases `slot`.
///
/// All record writes happen on the blocking pool. The terminal record is
/// written before the slot is dropped, so anyone woken by the completion
/// signal sees `complete` or `error`.
pub(super) async fn run_worker(
    store: Arc<Store>,
    opts: TransferOptions,
    req: DownloadRequest,
    template: DownloadRecord,
    slot: TaskSlot,
) {
    let abort = slot.abort_token();
    let progress = Arc::new(RecordProgress::new(store, template));
    let download_start = Instant::now();
    tracing::info!(id = slot.id(), url = %req.url, dest = %req.dest.display(), "download started");

    let sink = Arc::clone(&progress);
    let joined = tokio::task::spawn_blocking(move || {
        sink.begin();
        let outcome = transfer::fetch_to_file(
            &req.url,
            &req.dest,
            req.sha256.as_deref(),
            Some(&*sink as &dyn ProgressSink),
            &abort,
            &opts,
        )
        .map_err(|e| e.to_string());
        sink.finish(&outcome);
        outcome
    })
    .await;

    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            // The transfer panicked or was cancelled before finishing, so
            // the terminal record is still unwritten.
            let outcome: Result<u64, String> = Err(EngineError::from(e).to_string());
            let sink = Arc::clone(&progress);
            let failed = outcome.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || sink.finish(&failed)).await {
                tracing::error!(id = slot.id(), "final download record not saved: {}", e);
            }
            outcome
        }
    };

    let failures = progress.failures();
    if failures > 0 {
        tracing::warn!(id = slot.id(), failures, "progress was not fully persisted");
    }

    let elapsed_secs = download_start.elapsed().as_secs_f64();
    match &outcome {
        Ok(bytes) => tracing::info!(id = slot.id(), bytes, elapsed_secs, "download complete"),
        Err(msg) => tracing::info!(id = slot.id(), error = %msg, elapsed_secs, "download ended"),
    }
    drop(slot);
}
