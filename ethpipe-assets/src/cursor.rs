//! Checkpoint for incremental assets.
//!
//! An incremental asset keeps a `cursor.json` in its output directory that
//! records the last block whose transactions are on disk, so the next run
//! only fetches the delta.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const CURSOR_FILE: &str = "cursor.json";

/// Progress of an incremental asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// The last block whose transactions have been fully written.
    pub last_block: u64,
    /// When the cursor was advanced.
    pub synced_at: DateTime<Utc>,
}

impl Cursor {
    /// A cursor at `last_block`, stamped with the current time.
    #[must_use]
    pub fn now(last_block: u64) -> Self {
        Self {
            last_block,
            synced_at: Utc::now(),
        }
    }

    /// Path of the cursor file inside `dir`.
    #[must_use]
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CURSOR_FILE)
    }

    /// Read the cursor from `<dir>/cursor.json`.
    ///
    /// Returns `None` if the file does not exist or does not parse; a
    /// corrupted cursor is logged and the asset starts over.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(dir);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str::<Self>(&data) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupted cursor, starting fresh");
                Ok(None)
            }
        }
    }

    /// Persist the cursor to `<dir>/cursor.json` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let path = Self::path(dir);
        let tmp = path.with_extension("json.tmp");

        std::fs::write(&tmp, serde_json::to_string_pretty(self)?.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_cursor_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Cursor::load(dir.path()).unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cursor = Cursor::now(19_000_000);
        cursor.save(&nested).unwrap();

        assert_eq!(Cursor::load(&nested).unwrap(), Some(cursor));
        assert!(
            !nested.join("cursor.json.tmp").exists(),
            "temp file renamed away"
        );
    }

    #[test]
    fn corrupted_cursor_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Cursor::path(dir.path()), "{ not json").unwrap();
        assert_eq!(Cursor::load(dir.path()).unwrap(), None);
    }
}
