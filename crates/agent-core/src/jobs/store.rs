//! Durable job handle persistence

use super::types::JobHandle;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Key-value persistence for one job handle per key
#[cfg_attr(test, mockall::automock)]
pub trait HandleStore: Send + Sync {
    /// Load the handle stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<JobHandle>>;

    /// Store `handle` under `key`, replacing any previous handle
    ///
    /// Must not return before the handle is durable.
    fn save(&self, key: &str, handle: &JobHandle) -> Result<()>;
}

/// On-disk record format
#[derive(Debug, Serialize, Deserialize)]
struct HandleRecord {
    fine_tune_id: String,
}

/// Handle store keeping one JSON file per key in a directory
///
/// Each file holds `{"fine_tune_id": "<handle>"}`. Writes go to a temporary
/// file that is synced and then renamed over the target, so a crash never
/// leaves a partially written record.
#[derive(Debug, Clone)]
pub struct FileHandleStore {
    dir: PathBuf,
}

impl FileHandleStore {
    /// Create a store rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }

    fn store_error(key: &str, message: String) -> Error {
        Error::Store {
            key: key.to_string(),
            message,
        }
    }
}

impl HandleStore for FileHandleStore {
    fn load(&self, key: &str) -> Result<Option<JobHandle>> {
        let path = self.path_for(key);

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, path = %path.display(), "No persisted handle");
                return Ok(None);
            }
            Err(e) => {
                return Err(Self::store_error(
                    key,
                    format!("failed to read {}: {e}", path.display()),
                ));
            }
        };

        match serde_json::from_str::<HandleRecord>(&raw) {
            Ok(record) if !record.fine_tune_id.trim().is_empty() => {
                Ok(Some(JobHandle::new(record.fine_tune_id)))
            }
            Ok(_) => {
                warn!(key, path = %path.display(), "Persisted handle is empty, ignoring it");
                Ok(None)
            }
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "Persisted handle is corrupt, ignoring it");
                Ok(None)
            }
        }
    }

    fn save(&self, key: &str, handle: &JobHandle) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        fs::create_dir_all(&self.dir).map_err(|e| {
            Self::store_error(
                key,
                format!("failed to create directory {}: {e}", self.dir.display()),
            )
        })?;

        let record = HandleRecord {
            fine_tune_id: handle.as_str().to_string(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| Self::store_error(key, format!("failed to serialize handle: {e}")))?;

        let mut file = File::create(&tmp_path).map_err(|e| {
            Self::store_error(key, format!("failed to create {}: {e}", tmp_path.display()))
        })?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                Self::store_error(key, format!("failed to write {}: {e}", tmp_path.display()))
            })?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(|e| {
            Self::store_error(
                key,
                format!(
                    "failed to rename {} to {}: {e}",
                    tmp_path.display(),
                    path.display()
                ),
            )
        })?;

        if let Err(e) = sync_dir(&self.dir) {
            warn!(key, error = %e, "Failed to sync handle directory");
        }

        debug!(key, handle = %handle, path = %path.display(), "Persisted job handle");
        Ok(())
    }
}

/// Make a rename inside `dir` durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Map a caller-supplied key to a safe file stem
fn sanitize_key(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        stem
    }
}

/// In-process handle store
#[derive(Debug, Default)]
pub struct MemoryHandleStore {
    handles: Mutex<HashMap<String, JobHandle>>,
}

impl MemoryHandleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl HandleStore for MemoryHandleStore {
    fn load(&self, key: &str) -> Result<Option<JobHandle>> {
        let handles = self
            .handles
            .lock()
            .map_err(|_| FileHandleStore::store_error(key, "store lock poisoned".to_string()))?;
        Ok(handles.get(key).cloned())
    }

    fn save(&self, key: &str, handle: &JobHandle) -> Result<()> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| FileHandleStore::store_error(key, "store lock poisoned".to_string()))?;
        handles.insert(key.to_string(), handle.clone());
        Ok(())
    }
}
