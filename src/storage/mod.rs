//! Persistence layer.
//!
//! The canonical history lives in a single JSON file that is read once at
//! startup and overwritten wholesale after every reconciliation that
//! changes it. Writes go to a sibling temp file which is then renamed
//! over the target, so readers never observe a partial history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{DrawRecord, StorageError};

/// Default history file path.
pub const DEFAULT_HISTORY_FILE: &str = "dlt_history.json";

/// On-disk form of the canonical history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedHistory {
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    pub draws: Vec<DrawRecord>,
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Atomically replace the history file.
pub fn save_history(path: &Path, version: u64, draws: &[DrawRecord]) -> Result<(), StorageError> {
    let doc = PersistedHistoryRef {
        version,
        saved_at: Utc::now(),
        draws,
    };
    let json = serde_json::to_string(&doc).map_err(StorageError::Serialise)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let tmp = temp_path_for(path);
    std::fs::write(&tmp, json.as_bytes()).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }

    debug!(path = %path.display(), version, draws = draws.len(), "History saved");
    Ok(())
}

/// Load the history file. `Ok(None)` if it does not exist.
pub fn load_history(path: &Path) -> Result<Option<PersistedHistory>, StorageError> {
    if !path.exists() {
        info!(path = %path.display(), "No saved history found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let history: PersistedHistory =
        serde_json::from_str(&json).map_err(|source| StorageError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;

    info!(
        path = %path.display(),
        version = history.version,
        draws = history.draws.len(),
        "History loaded from disk"
    );
    Ok(Some(history))
}

/// Borrowed twin of [`PersistedHistory`] so saving doesn't clone the draws.
#[derive(Serialize)]
struct PersistedHistoryRef<'a> {
    version: u64,
    saved_at: DateTime<Utc>,
    draws: &'a [DrawRecord],
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| DEFAULT_HISTORY_FILE.into());
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
