//! The download state document (`downloads/state.json`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DOWNLOAD_STATE_VERSION: &str = "1.0";

/// Lifecycle of a persisted download record.
///
/// `downloading → complete | error`. `Paused` is part of the schema but
/// nothing produces or consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Paused,
    Complete,
    Error,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Complete => "complete",
            DownloadStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadStatus::Complete | DownloadStatus::Error)
    }
}

/// Persisted view of one download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: String,
    pub url: String,
    pub dest_path: PathBuf,
    /// 0 when the server did not report a length.
    pub total_bytes: u64,
    pub downloaded: u64,
    pub started_at: i64,
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl DownloadRecord {
    pub fn started(id: &str, url: &str, dest_path: PathBuf, started_at: i64) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            dest_path,
            total_bytes: 0,
            downloaded: 0,
            started_at,
            status: DownloadStatus::Downloading,
            error: None,
            finished_at: None,
        }
    }

    pub fn complete(&mut self, bytes: u64, now: i64) {
        self.downloaded = bytes;
        self.total_bytes = self.total_bytes.max(bytes);
        self.status = DownloadStatus::Complete;
        self.error = None;
        self.finished_at = Some(now);
    }

    pub fn fail(&mut self, message: impl Into<String>, now: i64) {
        self.status = DownloadStatus::Error;
        self.error = Some(message.into());
        self.finished_at = Some(now);
    }

    /// Whether this finished record has outlived `retention` at `now`.
    pub fn expired(&self, now: i64, retention: Duration) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        let finished = self.finished_at.unwrap_or(self.started_at);
        now.saturating_sub(finished) > retention.as_secs() as i64
    }
}

/// Root download state document, keyed by download id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadState {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub downloads: BTreeMap<String, DownloadRecord>,
}

fn default_version() -> String {
    DOWNLOAD_STATE_VERSION.to_string()
}

impl Default for DownloadState {
    fn default() -> Self {
        Self {
            version: default_version(),
            downloads: BTreeMap::new(),
        }
    }
}

impl DownloadState {
    /// Records with status `downloading`, oldest first.
    pub fn active(&self) -> Vec<DownloadRecord> {
        let mut v: Vec<_> = self
            .downloads
            .values()
            .filter(|r| r.status == DownloadStatus::Downloading)
            .cloned()
            .collect();
        v.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        v
    }

    /// Drop finished records older than `retention`. Returns how many were removed.
    pub fn prune_finished(&mut self, now: i64, retention: Duration) -> usize {
        let before = self.downloads.len();
        self.downloads.retain(|_, r| !r.expired(now, retention));
        before - self.downloads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn record(id: &str, started_at: i64) -> DownloadRecord {
        DownloadRecord::started(id, "http://x/y.img", PathBuf::from("/tmp/y.img"), started_at)
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DownloadStatus::Downloading).unwrap(),
            "\"downloading\""
        );
        let s: DownloadStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(s, DownloadStatus::Paused);
        assert_eq!(DownloadStatus::Complete.as_str(), "complete");
    }

    #[test]
    fn terminal_states() {
        assert!(DownloadStatus::Complete.is_terminal());
        assert!(DownloadStatus::Error.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
        assert!(!DownloadStatus::Paused.is_terminal());
    }

    #[test]
    fn complete_fills_unknown_total() {
        let mut r = record("a", 0);
        r.complete(18, 5);
        assert_eq!(r.total_bytes, 18);
        assert_eq!(r.downloaded, 18);
        assert_eq!(r.finished_at, Some(5));
    }

    #[test]
    fn prune_keeps_active_and_recent() {
        let now = 10_000;
        let mut st = DownloadState::default();
        let active = record("active", 0);
        let mut recent = record("recent", now - 100);
        recent.complete(1, now - 50);
        let mut old_done = record("old-done", 0);
        old_done.complete(1, now - 3601);
        let mut old_err = record("old-err", 0);
        old_err.fail("boom", now - 7200);
        for r in [active, recent, old_done, old_err] {
            st.downloads.insert(r.id.clone(), r);
        }
        assert_eq!(st.prune_finished(now, HOUR), 2);
        let ids: Vec<_> = st.downloads.keys().cloned().collect();
        assert_eq!(ids, vec!["active".to_string(), "recent".to_string()]);
    }

    #[test]
    fn active_sorted_by_start() {
        let mut st = DownloadState::default();
        for (id, t) in [("b", 20), ("a", 10), ("c", 30)] {
            st.downloads.insert(id.to_string(), record(id, t));
        }
        let mut done = record("d", 5);
        done.complete(1, 6);
        st.downloads.insert("d".to_string(), done);
        let ids: Vec<_> = st.active().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_fields_default() {
        let st: DownloadState = serde_json::from_str("{}").unwrap();
        assert_eq!(st.version, DOWNLOAD_STATE_VERSION);
        assert!(st.downloads.is_empty());
    }
}
