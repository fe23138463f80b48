// Task Registry - task factories and queue definitions by identifier

use crate::domain::{ActiveQueue, DefinitionId, DomainError, QueueDefinition, QueueInstance, TaskId};
use crate::port::{Task, TaskFactory};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Two flat lookups populated before the runner starts.
///
/// The runner holds it behind an `Arc`, so it is read-only while stepping.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskFactory>,
    definitions: HashMap<DefinitionId, QueueDefinition>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task identifier with a factory closure
    ///
    /// # Example
    /// ```text
    /// registry.register_task("A", || DelayTask::new(Duration::from_secs(2)))?;
    /// ```
    pub fn register_task<T, F>(&mut self, id: impl Into<String>, factory: F) -> Result<(), DomainError>
    where
        T: Task + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: TaskFactory = Arc::new(move || Box::new(factory()) as Box<dyn Task>);
        self.register_task_factory(id, factory)
    }

    /// Register an already boxed factory
    pub fn register_task_factory(
        &mut self,
        id: impl Into<String>,
        factory: TaskFactory,
    ) -> Result<(), DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "task id cannot be empty".to_string(),
            ));
        }
        if self.tasks.insert(id.clone(), factory).is_some() {
            debug!(task_id = %id, "Replaced task factory");
        } else {
            debug!(task_id = %id, "Registered task");
        }
        Ok(())
    }

    pub fn unregister_task(&mut self, id: &str) -> bool {
        self.tasks.remove(id).is_some()
    }

    /// Register a queue definition (ordered task identifiers)
    pub fn register_queue<I, S>(&mut self, id: impl Into<String>, tasks: I) -> Result<(), DomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let definition = QueueDefinition::new(id, tasks)?;
        info!(
            definition_id = %definition.id(),
            tasks = ?definition.tasks(),
            "Registered queue definition"
        );
        self.definitions
            .insert(definition.id().to_string(), definition);
        Ok(())
    }

    pub fn unregister_queue(&mut self, id: &str) -> bool {
        self.definitions.remove(id).is_some()
    }

    pub fn definition(&self, id: &str) -> Result<&QueueDefinition, DomainError> {
        self.definitions
            .get(id)
            .ok_or_else(|| DomainError::UnknownDefinition(id.to_string()))
    }

    pub fn has_task(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// Build a fresh task for one step
    pub fn create_task(&self, id: &str) -> Result<Box<dyn Task>, DomainError> {
        self.tasks
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| DomainError::UnknownTask(id.to_string()))
    }

    /// Resolve a persisted instance against the current definitions
    ///
    /// # Errors
    /// - `UnknownDefinition` if the definition is no longer registered
    /// - `CursorOutOfBounds` if the cursor does not fit the definition
    pub fn resolve(&self, instance: QueueInstance) -> Result<ActiveQueue, DomainError> {
        let definition = self.definition(&instance.definition_id)?.clone();
        ActiveQueue::new(instance, definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskContext;

    struct Noop;
    impl Task for Noop {}

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register_task("A", || Noop).unwrap();
        registry.register_queue("QA", ["A", "A"]).unwrap();
        registry
    }

    #[test]
    fn test_unknown_task_is_error() {
        let registry = registry();
        assert!(registry.create_task("A").is_ok());
        assert_eq!(
            registry.create_task("Z").err(),
            Some(DomainError::UnknownTask("Z".to_string()))
        );
    }

    #[test]
    fn test_resolve_unknown_definition() {
        let registry = registry();
        let inst = QueueInstance::new("i", "missing", TaskContext::new());
        assert!(matches!(
            registry.resolve(inst),
            Err(DomainError::UnknownDefinition(_))
        ));
    }

    #[test]
    fn test_unregister() {
        let mut registry = registry();
        assert!(registry.unregister_task("A"));
        assert!(!registry.has_task("A"));
        assert!(registry.unregister_queue("QA"));
        assert!(registry.definition("QA").is_err());
        assert!(!registry.unregister_queue("QA"));
    }

    #[test]
    fn test_empty_ids_rejected() {
        let mut registry = TaskRegistry::new();
        assert!(registry.register_task(" ", || Noop).is_err());
        assert!(registry.register_queue("", ["A"]).is_err());
    }
}
