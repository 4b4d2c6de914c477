//! File-backed snapshot store.
//!
//! Persists the store snapshot as a single JSON file. Writes go to a
//! temporary sibling first and are renamed into place so a crash mid-write
//! never leaves a torn snapshot.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::ports::{SnapshotError, SnapshotStore, StoreSnapshot, SNAPSHOT_NAME};

/// Snapshot store writing to a local JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Creates a store persisting to the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store persisting under the given directory, using the
    /// snapshot record name as the file name.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(format!("{SNAPSHOT_NAME}.json")),
        }
    }

    /// Path of the persisted snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| SnapshotError::Serialize(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SnapshotError::Io(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), "snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoreSnapshot>, SnapshotError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SnapshotError::Io(e.to_string())),
        };

        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| SnapshotError::Deserialize(e.to_string()))?;
        Ok(Some(snapshot))
    }
}
