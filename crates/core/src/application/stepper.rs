//! Queue Stepper - one state transition per queue per tick
//!
//! States are keyed by (`direction`, `step_done`):
//! - ActionPending (`step_done = false`): run `execute` / `undo` on the task at
//!   the cursor. `Completed` advances immediately; `AwaitingConfirmation`
//!   sets `step_done` and leaves the check for the next tick.
//! - AwaitingConfirmation (`step_done = true`): run `check` / `undo_check`.
//!   Confirmed advances; unconfirmed leaves the instance untouched.
//!
//! A drained queue (forward past the end, backward below zero) is marked
//! finished without invoking any task.

use crate::application::registry::TaskRegistry;
use crate::domain::{ActiveQueue, Direction, DomainError, TaskContext};
use crate::error::Result;
use crate::port::{ActionOutcome, Operation, Task, TaskError, TaskResult};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a single step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Queue was already drained; no task invoked
    Drained,
    /// Action completed and the cursor advanced in the same step
    Advanced,
    /// Action issued; confirmation runs on the next tick
    ActionIssued,
    /// Confirmation succeeded and the cursor advanced
    Confirmed,
    /// Confirmation still outstanding
    Unconfirmed,
}

/// Which phase of the state machine an instance is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    ActionPending,
    AwaitingConfirmation,
}

impl StepPhase {
    pub fn from_step_done(step_done: bool) -> Self {
        if step_done {
            StepPhase::AwaitingConfirmation
        } else {
            StepPhase::ActionPending
        }
    }

    /// Contract operation for this phase in the given direction
    pub fn operation(self, direction: Direction) -> Operation {
        match (direction, self) {
            (Direction::Forward, StepPhase::ActionPending) => Operation::Execute,
            (Direction::Forward, StepPhase::AwaitingConfirmation) => Operation::Check,
            (Direction::Backward, StepPhase::ActionPending) => Operation::Undo,
            (Direction::Backward, StepPhase::AwaitingConfirmation) => Operation::UndoCheck,
        }
    }
}

enum OperationReply {
    Action(ActionOutcome),
    Confirmation(bool),
}

/// Executes exactly one state transition per invocation
pub struct QueueStepper {
    registry: Arc<TaskRegistry>,
    step_timeout: Option<Duration>,
}

impl QueueStepper {
    /// # Arguments
    /// * `registry` - Task factories used to build the task at the cursor
    /// * `step_timeout` - Optional bound on a single task operation. On
    ///   expiry the operation is aborted at its next await point; blocking-pool
    ///   work it started (`tokio::fs`) keeps running and can overlap the next
    ///   operation, so only one operation at a time holds without a timeout.
    pub fn new(registry: Arc<TaskRegistry>, step_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            step_timeout,
        }
    }

    /// Advance `queue` by at most one transition
    ///
    /// # Errors
    /// - `AppError::Domain(UnknownTask)` if the task at the cursor is not registered
    /// - `AppError::Task` if the task operation failed, panicked or timed out;
    ///   `queue` is left exactly as it was
    pub async fn step(&self, queue: &mut ActiveQueue) -> Result<StepOutcome> {
        if queue.settle() {
            info!(
                instance_id = %queue.instance().instance_id,
                direction = %queue.instance().direction,
                "Queue drained"
            );
            return Ok(StepOutcome::Drained);
        }

        let task_id = queue
            .active_task()
            .cloned()
            .ok_or_else(|| DomainError::CursorOutOfBounds {
                instance_id: queue.instance().instance_id.clone(),
                cursor: queue.instance().cursor,
                direction: queue.instance().direction.to_string(),
                len: queue.definition().len(),
            })?;
        let task = self.registry.create_task(&task_id)?;

        let instance = queue.instance();
        let phase = StepPhase::from_step_done(instance.step_done);
        let operation = phase.operation(instance.direction);

        debug!(
            instance_id = %instance.instance_id,
            definition_id = %instance.definition_id,
            progress = %queue.render_progress(),
            task_id = %task_id,
            operation = %operation,
            "Stepping queue"
        );

        // The task works on a copy; the queue only sees it once the operation succeeded
        let context = instance.context.clone();
        let (reply, context) = match self.invoke(task, operation, context).await {
            Ok(done) => done,
            Err(e) => {
                warn!(
                    instance_id = %queue.instance().instance_id,
                    task_id = %task_id,
                    operation = %operation,
                    error = %e,
                    "Task operation failed"
                );
                return Err(e.into());
            }
        };
        queue.instance_mut().context = context;

        let outcome = match reply {
            OperationReply::Action(ActionOutcome::Completed) => {
                queue.advance();
                StepOutcome::Advanced
            }
            OperationReply::Action(ActionOutcome::AwaitingConfirmation) => {
                queue.instance_mut().mark_step_done();
                StepOutcome::ActionIssued
            }
            OperationReply::Confirmation(true) => {
                queue.advance();
                StepOutcome::Confirmed
            }
            OperationReply::Confirmation(false) => StepOutcome::Unconfirmed,
        };

        debug!(
            instance_id = %queue.instance().instance_id,
            cursor = queue.instance().cursor,
            step_done = queue.instance().step_done,
            outcome = ?outcome,
            "Step complete"
        );

        Ok(outcome)
    }

    /// Run one contract operation on its own tokio task so a panic is
    /// reported as `TaskError::Panicked` instead of unwinding the runner
    async fn invoke(
        &self,
        task: Box<dyn Task>,
        operation: Operation,
        mut context: TaskContext,
    ) -> TaskResult<(OperationReply, TaskContext)> {
        let handle = tokio::task::spawn(async move {
            let reply = match operation {
                Operation::Execute => task.execute(&mut context).await.map(OperationReply::Action),
                Operation::Undo => task.undo(&mut context).await.map(OperationReply::Action),
                Operation::Check => task.check(&context).await.map(OperationReply::Confirmation),
                Operation::UndoCheck => task
                    .undo_check(&context)
                    .await
                    .map(OperationReply::Confirmation),
            };
            reply.map(|r| (r, context))
        });
        let abort = handle.abort_handle();

        let joined = match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    return Err(TaskError::TimedOut(limit.as_millis() as u64));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(TaskError::Panicked(panic_message(join_err.into_panic())))
            }
            Err(join_err) => Err(TaskError::Failed(format!(
                "task operation cancelled: {}",
                join_err
            ))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
