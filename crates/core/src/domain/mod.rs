// Domain Layer - Queue definitions, persisted instances and their transitions

pub mod context;
pub mod error;
pub mod instance;
pub mod queue;

// Re-exports
pub use context::TaskContext;
pub use error::DomainError;
pub use instance::{DefinitionId, Direction, InstanceId, QueueInstance, TaskId};
pub use queue::{ActiveQueue, QueueDefinition};
