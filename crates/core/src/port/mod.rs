// Port Layer - Interfaces for tasks, persistence and policies

pub mod id_provider; // For deterministic testing
pub mod reversal;
pub mod snapshot_store;
pub mod task;

// Re-exports
pub use id_provider::{IdProvider, UuidProvider};
pub use reversal::{NeverReverse, RandomReversal, ReversalPolicy};
pub use snapshot_store::{decode_records, decode_snapshot, encode_snapshot, SnapshotStore};
pub use task::{ActionOutcome, Operation, Task, TaskError, TaskFactory, TaskResult};
