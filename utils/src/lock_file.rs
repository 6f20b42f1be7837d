//! Advisory lock marker files.
//!
//! A lock is held while its marker file exists. Acquisition is a single
//! exclusive create: it either succeeds immediately or reports the lock as
//! held. There is no waiting and no retry; contention goes back to the caller.
//!
//! The marker's content (writer pid, creation time) is informational. Nothing
//! reads it to decide who owns the lock.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomic_write::atomic_write_new;

/// Informational content of a lock marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolder {
    pub pid: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {} is held by another writer{}", path.display(), describe_holder(holder.as_ref()))]
    Held {
        path: PathBuf,
        holder: Option<LockHolder>,
    },
    #[error("failed to create lock {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

fn describe_holder(holder: Option<&LockHolder>) -> String {
    holder.map_or_else(String::new, |h| {
        format!(" (pid {}, since {})", h.pid, h.created_at.to_rfc3339())
    })
}

/// A held lock. The marker is removed when this is released or dropped.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    released: bool,
}

impl LockFile {
    /// Try once to take the lock at `path`.
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        let holder = LockHolder {
            pid: process::id(),
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&holder).map_err(|e| LockError::Io {
            path: path.clone(),
            source: io::Error::new(ErrorKind::InvalidData, e),
        })?;

        match atomic_write_new(&path, &bytes) {
            Ok(()) => {
                tracing::trace!(path = %path.display(), "Lock acquired");
                Ok(Self {
                    path,
                    released: false,
                })
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let holder = Self::read_holder(&path);
                tracing::debug!(path = %path.display(), ?holder, "Lock contended");
                Err(LockError::Held { path, holder })
            }
            Err(source) => Err(LockError::Io { path, source }),
        }
    }

    /// Read the marker content at `path`, if present and parseable.
    #[must_use]
    pub fn read_holder(path: &Path) -> Option<LockHolder> {
        let bytes = fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the marker, reporting failure. Dropping does the same
    /// best-effort.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_marker(&self.path)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_marker(&self.path) {
            tracing::warn!(path = %self.path.display(), "Failed to remove lock marker: {e}");
        }
    }
}

fn remove_marker(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
