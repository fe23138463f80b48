// JSON File SnapshotStore Implementation

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use stepwise_core::domain::QueueInstance;
use stepwise_core::error::{AppError, Result};
use stepwise_core::port::{decode_snapshot, encode_snapshot, SnapshotStore};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Active-queue snapshot stored as one JSON array document.
///
/// Saves go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous snapshot in place.
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load_snapshot(&self) -> Result<Vec<QueueInstance>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(AppError::Persistence(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        decode_snapshot(&raw).map_err(|e| {
            AppError::Persistence(format!("corrupt snapshot {}: {}", self.path.display(), e))
        })
    }

    async fn save_snapshot(&self, instances: &[QueueInstance]) -> Result<()> {
        let raw = encode_snapshot(instances)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(raw.as_bytes()).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp, &self.path).await.map_err(|e| {
            AppError::Persistence(format!(
                "failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(
            path = %self.path.display(),
            instances = instances.len(),
            "Snapshot saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::domain::{Direction, TaskContext};
    use tempfile::TempDir;
    use tokio_test::assert_err;

    fn instance(id: &str) -> QueueInstance {
        let mut context = TaskContext::new();
        context.insert("attempt", 1);
        QueueInstance::new(id, "QA", context)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_set() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("queues.json"));
        assert!(store.load_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("queues.json");
        let store = JsonFileSnapshotStore::new(&path);

        let mut second = instance("b");
        second.cursor = 1;
        second.direction = Direction::Backward;
        store
            .save_snapshot(&[instance("a"), second.clone()])
            .await
            .unwrap();

        assert!(path.exists());
        assert!(!store.temp_path().exists());

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].instance_id, "a");
        assert_eq!(loaded[1], second);
    }

    #[tokio::test]
    async fn test_written_document_uses_flat_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queues.json");
        let store = JsonFileSnapshotStore::new(&path);
        store.save_snapshot(&[instance("a")]).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"instanceId\": \"a\""));
        assert!(raw.contains("\"direction\": false"));
        assert!(!raw.contains("finished"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queues.json");
        std::fs::write(&path, "[{ truncated").unwrap();

        let store = JsonFileSnapshotStore::new(&path);
        let err = assert_err!(store.load_snapshot().await);
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_empty_save_clears_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("queues.json"));
        store.save_snapshot(&[instance("a")]).await.unwrap();
        store.save_snapshot(&[]).await.unwrap();
        assert!(store.load_snapshot().await.unwrap().is_empty());
    }
}
