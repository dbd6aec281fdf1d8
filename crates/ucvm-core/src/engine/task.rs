//! Registry of running downloads: abort token and completion signal per id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use super::EngineError;

#[derive(Debug)]
struct TaskHandle {
    abort: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
}

/// Shared map of download id -> running task. An id is present exactly while
/// its worker runs.
#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskHandle>>,
}

impl TaskRegistry {
    /// Check-and-insert under one write lock, so two concurrent starts of the
    /// same id cannot both succeed.
    pub(crate) fn register(self: &Arc<Self>, id: &str) -> Result<TaskSlot, EngineError> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(id) {
            return Err(EngineError::AlreadyInProgress(id.to_string()));
        }
        let abort = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);
        tasks.insert(
            id.to_string(),
            TaskHandle {
                abort: Arc::clone(&abort),
                done: done_rx,
            },
        );
        Ok(TaskSlot {
            registry: Arc::clone(self),
            id: id.to_string(),
            abort,
            done: done_tx,
        })
    }

    pub(crate) fn is_active(&self, id: &str) -> bool {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Completion receiver for a running id.
    pub(crate) fn completion(&self, id: &str) -> Option<watch::Receiver<bool>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|t| t.done.clone())
    }

    /// Set the abort token for `id` and return its completion receiver.
    pub(crate) fn request_abort(&self, id: &str) -> Option<watch::Receiver<bool>> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let task = tasks.get(id)?;
        task.abort.store(true, Ordering::Relaxed);
        Some(task.done.clone())
    }

    fn remove(&self, id: &str) {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

/// Owned by the worker. Dropping it (normal exit or panic) removes the id
/// from the registry and then signals completion.
#[derive(Debug)]
pub(crate) struct TaskSlot {
    registry: Arc<TaskRegistry>,
    id: String,
    abort: Arc<AtomicBool>,
    done: watch::Sender<bool>,
}

impl TaskSlot {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn abort_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        self.done.send_replace(true);
    }
}
