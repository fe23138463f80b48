// Queue Definition & Active Queue

use std::sync::Arc;

use super::error::{DomainError, Result};
use super::instance::{DefinitionId, QueueInstance, TaskId};

/// Named, ordered sequence of task identifiers.
///
/// Immutable once built; cloning shares the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    id: DefinitionId,
    tasks: Arc<[TaskId]>,
}

impl QueueDefinition {
    pub fn new<I, S>(id: impl Into<String>, tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidDefinition(
                "definition id cannot be empty".to_string(),
            ));
        }

        let tasks: Vec<TaskId> = tasks.into_iter().map(Into::into).collect();
        if tasks.is_empty() {
            return Err(DomainError::InvalidDefinition(format!(
                "definition {} has no tasks",
                id
            )));
        }
        if let Some(pos) = tasks.iter().position(|t| t.trim().is_empty()) {
            return Err(DomainError::InvalidDefinition(format!(
                "definition {} has an empty task id at index {}",
                id, pos
            )));
        }

        Ok(Self {
            id,
            tasks: tasks.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A persisted instance resolved against its definition
#[derive(Debug, Clone)]
pub struct ActiveQueue {
    instance: QueueInstance,
    definition: QueueDefinition,
}

impl ActiveQueue {
    /// Pair an instance with its definition, rejecting cursors outside the
    /// range allowed for the instance's direction
    pub fn new(instance: QueueInstance, definition: QueueDefinition) -> Result<Self> {
        if !instance.is_within_bounds(definition.len()) {
            return Err(DomainError::CursorOutOfBounds {
                instance_id: instance.instance_id.clone(),
                cursor: instance.cursor,
                direction: instance.direction.to_string(),
                len: definition.len(),
            });
        }
        Ok(Self {
            instance,
            definition,
        })
    }

    pub fn instance(&self) -> &QueueInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut QueueInstance {
        &mut self.instance
    }

    pub fn definition(&self) -> &QueueDefinition {
        &self.definition
    }

    pub fn into_instance(self) -> QueueInstance {
        self.instance
    }

    pub fn is_finished(&self) -> bool {
        self.instance.is_finished()
    }

    /// Flip to compensation unless the forward pass already drained
    pub fn reverse(&mut self) -> bool {
        if self.instance.is_drained(self.definition.len()) {
            return false;
        }
        self.instance.reverse()
    }

    /// Task at the cursor, or `None` once the queue is drained
    pub fn active_task(&self) -> Option<&TaskId> {
        if self.instance.is_drained(self.definition.len()) {
            return None;
        }
        usize::try_from(self.instance.cursor)
            .ok()
            .and_then(|idx| self.definition.tasks().get(idx))
    }

    pub fn advance(&mut self) {
        let len = self.definition.len();
        self.instance.advance(len);
    }

    /// Mark finished if drained; returns whether the queue is finished
    pub fn settle(&mut self) -> bool {
        let len = self.definition.len();
        self.instance.settle(len)
    }

    /// One-line rendering of the queue, e.g. `| A   | B > | C   |`
    pub fn render_progress(&self) -> String {
        let mut out = String::new();
        for (idx, task) in self.definition.tasks().iter().enumerate() {
            let marker = if idx as i64 == self.instance.cursor {
                self.instance.direction.marker()
            } else {
                ' '
            };
            out.push_str(&format!("| {} {} ", task, marker));
        }
        out.push('|');
        out
    }
}
