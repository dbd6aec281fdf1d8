//! Temp file lifecycle for an in-flight transfer.
//!
//! The body is written to `<dest>.downloading` and only renamed onto `dest`
//! once complete (and verified). Dropping the guard before a successful
//! rename removes the temp file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::TransferError;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".downloading";

/// Path for the temp file: appends `.downloading` to the final path
/// (e.g. `noble.img` → `noble.img.downloading`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Owns the temp file; removes it on drop unless `persist` succeeded.
pub(crate) struct TempFile {
    file: Option<File>,
    path: PathBuf,
    renamed: bool,
}

impl TempFile {
    /// Exclusively create the temp file next to `final_path`. An existing one
    /// belongs to someone else and is left alone.
    pub(crate) fn create(final_path: &Path) -> Result<Self, TransferError> {
        let path = temp_path(final_path);
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(TransferError::TempInUse { path });
            }
            Err(e) => return Err(TransferError::io("create", &path, e)),
        };
        Ok(Self {
            file: Some(file),
            path,
            renamed: false,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn writer(&mut self) -> Result<&mut File, TransferError> {
        let path = &self.path;
        self.file.as_mut().ok_or_else(|| {
            TransferError::io(
                "write",
                path,
                std::io::Error::new(std::io::ErrorKind::Other, "temp file already closed"),
            )
        })
    }

    /// Flush and fsync the body so the rename publishes durable content.
    pub(crate) fn sync(&mut self) -> Result<(), TransferError> {
        let path = self.path.clone();
        let file = self.writer()?;
        file.flush().map_err(|e| TransferError::io("flush", &path, e))?;
        file.sync_all().map_err(|e| TransferError::io("sync", &path, e))
    }

    /// Close the handle and atomically rename onto `final_path`.
    pub(crate) fn persist(mut self, final_path: &Path) -> Result<(), TransferError> {
        drop(self.file.take());
        std::fs::rename(&self.path, final_path)
            .map_err(|e| TransferError::io("rename", final_path, e))?;
        self.renamed = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.renamed {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "could not remove temp file: {}", e);
            }
        }
    }
}
