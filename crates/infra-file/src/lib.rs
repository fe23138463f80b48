// Stepwise Infrastructure - JSON File Adapter
// Implements: SnapshotStore

mod snapshot_store;

pub use snapshot_store::JsonFileSnapshotStore;
