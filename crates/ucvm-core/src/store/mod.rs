//! Persistent application state: `settings.json` and the download state document.
//!
//! Both documents are JSON files replaced atomically (temp file + rename).
//! One read/write lock per `Store` serializes loads and saves of both
//! documents within a process. There is no cross-process lock: two `ucvm`
//! processes saving the same document race with last-writer-wins, though
//! neither can leave a torn file behind.

mod atomic;
mod downloads;
mod eviction;
mod settings;

pub use downloads::{DownloadRecord, DownloadState, DownloadStatus, DOWNLOAD_STATE_VERSION};
pub use settings::{
    builtin_presets, current_schema_version, AppSettings, CloudImage, PackagePreset, Settings,
    VmConfig, SCHEMA_MAJOR, SCHEMA_MINOR,
};

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{StoreLimits, UcvmConfig};

/// Seconds since the Unix epoch.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Handle to the two persisted documents.
pub struct Store {
    settings_path: PathBuf,
    downloads_path: PathBuf,
    limits: StoreLimits,
    retention: Duration,
    lock: RwLock<()>,
}

impl Store {
    /// Store at explicit paths with default limits and a 1-hour retention window.
    pub fn new(settings_path: impl Into<PathBuf>, downloads_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
            downloads_path: downloads_path.into(),
            limits: StoreLimits::default(),
            retention: Duration::from_secs(3600),
            lock: RwLock::new(()),
        }
    }

    /// Store rooted at `dir`: `dir/settings.json` and `dir/downloads/state.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(
            dir.join("settings.json"),
            dir.join("downloads").join("state.json"),
        )
    }

    /// Default XDG locations: `~/.config/ucvm/settings.json` and
    /// `~/.local/state/ucvm/downloads/state.json`.
    pub fn open_default(cfg: &UcvmConfig) -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("ucvm")?;
        let settings_path = xdg_dirs.place_config_file("settings.json")?;
        let downloads_path = xdg_dirs
            .get_state_home()
            .join("ucvm")
            .join("downloads")
            .join("state.json");
        Ok(Self::new(settings_path, downloads_path)
            .with_limits(cfg.limits)
            .with_retention(cfg.download_retention()))
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn downloads_path(&self) -> &Path {
        &self.downloads_path
    }

    /// Load settings; a missing file yields a fresh default document.
    pub fn load(&self) -> Result<Settings> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        self.load_settings_unlocked()
    }

    /// Enforce size limits, then atomically write settings.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut trimmed = settings.clone();
        self.save_settings_unlocked(&mut trimmed)
    }

    /// Load, apply `mutate`, and save while holding the write lock for the
    /// whole sequence. Nothing is written if `mutate` fails. Returns the saved
    /// document (after eviction).
    pub fn load_and_save<F>(&self, mutate: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings) -> Result<()>,
    {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut settings = self.load_settings_unlocked()?;
        mutate(&mut settings)?;
        self.save_settings_unlocked(&mut settings)?;
        Ok(settings)
    }

    /// Load download state; a missing file yields an empty document.
    pub fn load_download_state(&self) -> Result<DownloadState> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        self.load_downloads_unlocked()
    }

    /// Prune expired finished records, then atomically write download state.
    pub fn save_download_state(&self, state: &DownloadState) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut pruned = state.clone();
        self.save_downloads_unlocked(&mut pruned)
    }

    /// Load–mutate–save of the download state under one write lock, so
    /// concurrent workers in this process never drop each other's records.
    pub fn update_download_state<F, R>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut DownloadState) -> R,
    {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.load_downloads_unlocked()?;
        let out = mutate(&mut state);
        self.save_downloads_unlocked(&mut state)?;
        Ok(out)
    }

    fn load_settings_unlocked(&self) -> Result<Settings> {
        match atomic::read_json::<settings::SettingsFile>(&self.settings_path)? {
            Some(file) => Ok(settings::migrate(file)),
            None => Ok(Settings::default()),
        }
    }

    fn save_settings_unlocked(&self, settings: &mut Settings) -> Result<()> {
        eviction::enforce_limits(settings, &self.limits);
        atomic::write_json_atomic(&self.settings_path, settings)
    }

    fn load_downloads_unlocked(&self) -> Result<DownloadState> {
        Ok(atomic::read_json(&self.downloads_path)?.unwrap_or_default())
    }

    fn save_downloads_unlocked(&self, state: &mut DownloadState) -> Result<()> {
        let pruned = state.prune_finished(now_unix(), self.retention);
        if pruned > 0 {
            tracing::debug!(pruned, "pruned finished download records");
        }
        atomic::write_json_atomic(&self.downloads_path, state)
    }
}
