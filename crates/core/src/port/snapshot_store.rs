// Snapshot Store Port (durable active-queue set)

use crate::domain::QueueInstance;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

/// Persistence interface for the active queue set.
///
/// The whole set is read and rewritten each tick; `save_snapshot` must
/// replace the previous snapshot atomically.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load every persisted instance, in snapshot order
    async fn load_snapshot(&self) -> Result<Vec<QueueInstance>>;

    /// Atomically replace the snapshot with `instances`
    async fn save_snapshot(&self, instances: &[QueueInstance]) -> Result<()>;
}

/// Decode a JSON snapshot (array of instance records).
///
/// A malformed document is an error; an individual malformed record is
/// skipped and logged so the remaining instances still resume.
pub fn decode_snapshot(raw: &str) -> Result<Vec<QueueInstance>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let records: Vec<Value> = serde_json::from_str(raw)?;
    Ok(decode_records(records))
}

/// Decode already-parsed records, skipping the ones that do not fit
pub fn decode_records(records: Vec<Value>) -> Vec<QueueInstance> {
    let mut instances = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<QueueInstance>(record) {
            Ok(instance) => instances.push(instance),
            Err(e) => {
                warn!(position = position, error = %e, "Skipping malformed snapshot record");
            }
        }
    }
    instances
}

/// Encode instances as a JSON snapshot document
pub fn encode_snapshot(instances: &[QueueInstance]) -> Result<String> {
    Ok(serde_json::to_string_pretty(instances)?)
}

// ============================================================================
// In-Memory Implementation for Testing
// ============================================================================

#[cfg(any(test, feature = "test-support"))]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Snapshot store holding the encoded document in memory.
    ///
    /// Goes through the same JSON encoding as the file store, so runtime-only
    /// state is dropped exactly as it would be on disk.
    #[derive(Clone, Default)]
    pub struct InMemorySnapshotStore {
        document: Arc<Mutex<String>>,
        saves: Arc<Mutex<usize>>,
    }

    impl InMemorySnapshotStore {
        pub fn new() -> Self {
            Self::default()
        }
        pub fn seeded(instances: &[QueueInstance]) -> Self {
            let store = Self::new();
            *store.document.lock().unwrap() = encode_snapshot(instances).unwrap();
            store
        }
        pub fn set_document(&self, raw: impl Into<String>) {
            *self.document.lock().unwrap() = raw.into();
        }
        pub fn document(&self) -> String {
            self.document.lock().unwrap().clone()
        }
        pub fn current(&self) -> Vec<QueueInstance> {
            decode_snapshot(&self.document()).unwrap()
        }
        pub fn save_count(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    #[async_trait]
    impl SnapshotStore for InMemorySnapshotStore {
        async fn load_snapshot(&self) -> Result<Vec<QueueInstance>> {
            decode_snapshot(&self.document())
        }
        async fn save_snapshot(&self, instances: &[QueueInstance]) -> Result<()> {
            let raw = encode_snapshot(instances)?;
            *self.document.lock().unwrap() = raw;
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, TaskContext};

    #[test]
    fn test_decode_skips_malformed_records() {
        let raw = r#"[
            {"instanceId": "a", "definitionId": "QA", "cursor": 2, "stepDone": true},
            {"definitionId": "QB"},
            {"instanceId": "c", "definitionId": "QC", "direction": true, "cursor": 1}
        ]"#;

        let instances = decode_snapshot(raw).unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].instance_id, "a");
        assert!(instances[0].step_done);
        assert_eq!(instances[1].direction, Direction::Backward);
    }

    #[test]
    fn test_decode_null_context_as_empty() {
        let raw = r#"[{"instanceId": "a", "definitionId": "QA", "context": null}]"#;
        let instances = decode_snapshot(raw).unwrap();
        assert_eq!(instances.len(), 1);
        assert!(instances[0].context.is_empty());
    }

    #[test]
    fn test_decode_rejects_corrupt_document() {
        assert!(decode_snapshot("{not json").is_err());
        assert!(decode_snapshot("{\"instanceId\": \"a\"}").is_err());
    }

    #[test]
    fn test_empty_document_is_empty_set() {
        assert!(decode_snapshot("").unwrap().is_empty());
        assert!(decode_snapshot("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_encode_keeps_order() {
        let instances = vec![
            QueueInstance::new("first", "QA", TaskContext::new()),
            QueueInstance::new("second", "QA", TaskContext::new()),
        ];
        let decoded = decode_snapshot(&encode_snapshot(&instances).unwrap()).unwrap();
        let ids: Vec<_> = decoded.iter().map(|i| i.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
