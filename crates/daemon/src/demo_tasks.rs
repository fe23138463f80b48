// Demo tasks registered by the daemon

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stepwise_core::application::TaskRegistry;
use stepwise_core::domain::{DomainError, TaskContext};
use stepwise_core::port::{ActionOutcome, Task, TaskError, TaskResult};
use tracing::debug;

pub const FORWARD_MARKER: &str = "forwards";
pub const BACKWARD_MARKER: &str = "backwards";

/// Long running action; holds up the rest of the tick while it sleeps
pub struct DelayTask {
    delay: Duration,
}

impl DelayTask {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Task for DelayTask {
    async fn execute(&self, _context: &mut TaskContext) -> TaskResult<ActionOutcome> {
        tokio::time::sleep(self.delay).await;
        Ok(ActionOutcome::Completed)
    }
}

/// Externally confirmed task.
///
/// The action consumes a marker file; confirmation waits until something
/// outside the daemon creates it again (`forwards` going forward,
/// `backwards` while compensating).
pub struct MarkerFileTask {
    dir: PathBuf,
}

impl MarkerFileTask {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn consume(&self, name: &str) -> TaskResult<ActionOutcome> {
        let path = self.dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(marker = %path.display(), "Marker consumed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(TaskError::Failed(format!(
                    "cannot remove {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        Ok(ActionOutcome::AwaitingConfirmation)
    }

    async fn present(&self, name: &str) -> TaskResult<bool> {
        marker_exists(&self.dir.join(name)).await
    }
}

async fn marker_exists(path: &Path) -> TaskResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| TaskError::Failed(format!("cannot stat {}: {}", path.display(), e)))
}

#[async_trait]
impl Task for MarkerFileTask {
    async fn execute(&self, _context: &mut TaskContext) -> TaskResult<ActionOutcome> {
        self.consume(FORWARD_MARKER).await
    }

    async fn check(&self, _context: &TaskContext) -> TaskResult<bool> {
        self.present(FORWARD_MARKER).await
    }

    async fn undo(&self, _context: &mut TaskContext) -> TaskResult<ActionOutcome> {
        self.consume(BACKWARD_MARKER).await
    }

    async fn undo_check(&self, _context: &TaskContext) -> TaskResult<bool> {
        self.present(BACKWARD_MARKER).await
    }
}

/// Task whose state lives in the context.
///
/// Actions move the `number` counter and remember the expected value;
/// checks confirm once the context holds it, which survives restarts.
pub struct ContextStampTask;

impl ContextStampTask {
    fn stamp(context: &mut TaskContext, delta: i64) -> ActionOutcome {
        let number = context.get_as::<i64>("number").unwrap_or(0) + delta;
        context.insert("number", number);
        context.insert("expected", number);
        ActionOutcome::AwaitingConfirmation
    }

    fn confirmed(context: &TaskContext) -> bool {
        match (
            context.get_as::<i64>("number"),
            context.get_as::<i64>("expected"),
        ) {
            (Some(number), Some(expected)) => number == expected,
            _ => false,
        }
    }
}

#[async_trait]
impl Task for ContextStampTask {
    async fn execute(&self, context: &mut TaskContext) -> TaskResult<ActionOutcome> {
        Ok(Self::stamp(context, 1))
    }

    async fn check(&self, context: &TaskContext) -> TaskResult<bool> {
        Ok(Self::confirmed(context))
    }

    async fn undo(&self, context: &mut TaskContext) -> TaskResult<ActionOutcome> {
        Ok(Self::stamp(context, -1))
    }

    async fn undo_check(&self, context: &TaskContext) -> TaskResult<bool> {
        Ok(Self::confirmed(context))
    }
}

/// Register the demo tasks `A`, `B`, `C` and queues `QA`, `QB`, `QC`
pub fn register_demo(registry: &mut TaskRegistry, marker_dir: &Path) -> Result<(), DomainError> {
    registry.register_task("A", || DelayTask::new(Duration::from_secs(2)))?;
    let dir = marker_dir.to_path_buf();
    registry.register_task("B", move || MarkerFileTask::new(dir.clone()))?;
    registry.register_task("C", || ContextStampTask)?;

    registry.register_queue("QA", ["A", "A", "C", "A", "C", "B"])?;
    registry.register_queue("QB", ["C", "B", "C", "C", "A"])?;
    registry.register_queue("QC", ["A", "A", "A", "B", "C", "C"])?;
    Ok(())
}

/// Initial admissions used when the snapshot is empty
pub fn demo_admissions() -> Vec<(&'static str, TaskContext)> {
    [("QA", "apple"), ("QB", "banana"), ("QC", "coco")]
        .into_iter()
        .map(|(queue, name)| {
            let mut context = TaskContext::new();
            context.insert("name", name);
            context.insert("number", 0);
            (queue, context)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_marker_task_waits_for_file() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join(FORWARD_MARKER);
        std::fs::write(&marker, "").unwrap();

        let task = MarkerFileTask::new(dir.path());
        let mut context = TaskContext::new();
        assert_eq!(
            task.execute(&mut context).await.unwrap(),
            ActionOutcome::AwaitingConfirmation
        );
        assert!(!marker.exists());
        assert!(!task.check(&context).await.unwrap());

        std::fs::write(&marker, "").unwrap();
        assert!(task.check(&context).await.unwrap());
    }

    #[tokio::test]
    async fn test_marker_task_undo_uses_backward_marker() {
        let dir = TempDir::new().unwrap();
        let task = MarkerFileTask::new(dir.path());
        let mut context = TaskContext::new();

        task.undo(&mut context).await.unwrap();
        assert!(!task.undo_check(&context).await.unwrap());
        std::fs::write(dir.path().join(BACKWARD_MARKER), "").unwrap();
        assert!(task.undo_check(&context).await.unwrap());
    }

    #[tokio::test]
    async fn test_context_stamp_round() {
        let task = ContextStampTask;
        let mut context = TaskContext::new();
        assert!(!task.check(&context).await.unwrap());

        task.execute(&mut context).await.unwrap();
        assert_eq!(context.get_as::<i64>("number"), Some(1));
        assert!(task.check(&context).await.unwrap());

        task.undo(&mut context).await.unwrap();
        assert_eq!(context.get_as::<i64>("number"), Some(0));
        assert!(task.undo_check(&context).await.unwrap());
    }

    #[tokio::test]
    async fn test_delay_task_completes() {
        let task = DelayTask::new(Duration::from_millis(10));
        let mut context = TaskContext::new();
        assert_eq!(
            task.execute(&mut context).await.unwrap(),
            ActionOutcome::Completed
        );
    }

    #[test]
    fn test_register_demo() {
        let mut registry = TaskRegistry::new();
        register_demo(&mut registry, Path::new(".")).unwrap();
        assert_eq!(registry.definition("QA").unwrap().len(), 6);
        assert!(registry.has_task("B"));
        assert_eq!(demo_admissions().len(), 3);
    }
}
