//! Progress reporting for transfers.
//!
//! A transfer reports `(downloaded, total)` through a [`ProgressSink`] on every
//! chunk written, without batching. Sinks that render or persist at a lower
//! rate must debounce on their side.

use std::io::Write;
use std::time::Instant;

/// Receives progress notifications from a running transfer.
///
/// Called from the transfer's thread; `total` is 0 when the server did not
/// send a Content-Length.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, downloaded: u64, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, downloaded: u64, total: u64) {
        self(downloaded, total)
    }
}

/// Wraps the temp file and counts bytes as they are written.
pub(crate) struct CountingWriter<'a, W: Write> {
    inner: W,
    sink: Option<&'a dyn ProgressSink>,
    written: u64,
}

impl<'a, W: Write> CountingWriter<'a, W> {
    pub(crate) fn new(inner: W, sink: Option<&'a dyn ProgressSink>) -> Self {
        Self {
            inner,
            sink,
            written: 0,
        }
    }

    /// Write one chunk and notify the sink.
    pub(crate) fn write_chunk(&mut self, data: &[u8], total: u64) -> std::io::Result<()> {
        self.inner.write_all(data)?;
        self.written += data.len() as u64;
        if let Some(sink) = self.sink {
            sink.on_progress(self.written, total);
        }
        Ok(())
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }
}

/// Snapshot of transfer progress with derived rate and ETA (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    pub downloaded: u64,
    /// 0 when unknown.
    pub total: u64,
    pub elapsed_secs: f64,
}

impl ProgressStats {
    pub fn since(started: Instant, downloaded: u64, total: u64) -> Self {
        Self {
            downloaded,
            total,
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }

    /// Download rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.downloaded as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if total is unknown or rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.downloaded);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]; None if total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.downloaded as f64 / self.total as f64).min(1.0))
    }
}
