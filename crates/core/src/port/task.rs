// Task Contract Port
// The four operations every task type implements (do / check / undo / undoCheck)

use crate::domain::TaskContext;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result of a forward or compensating action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action took effect; the cursor may advance right away
    Completed,
    /// The action was issued; a check must confirm it on a later tick
    AwaitingConfirmation,
}

impl ActionOutcome {
    pub fn from_completed(completed: bool) -> Self {
        if completed {
            ActionOutcome::Completed
        } else {
            ActionOutcome::AwaitingConfirmation
        }
    }
}

/// Which contract operation is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Execute,
    Check,
    Undo,
    UndoCheck,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Execute => write!(f, "execute"),
            Operation::Check => write!(f, "check"),
            Operation::Undo => write!(f, "undo"),
            Operation::UndoCheck => write!(f, "undo_check"),
        }
    }
}

/// Task operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task operation timed out after {0}ms")]
    TimedOut(u64),
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Task contract
///
/// Every operation receives the instance's context. Actions may mutate it;
/// checks only read it, so repeated confirmation polls cannot change what a
/// later check sees. All four default to immediate success, letting a task
/// override only the operations it needs.
///
/// A fresh task value is built for every step, so fields on the
/// implementing type are step-local.
#[async_trait]
pub trait Task: Send + Sync {
    /// Perform the forward action
    async fn execute(&self, _context: &mut TaskContext) -> TaskResult<ActionOutcome> {
        Ok(ActionOutcome::Completed)
    }

    /// Whether the forward action's effect is observable yet
    async fn check(&self, _context: &TaskContext) -> TaskResult<bool> {
        Ok(true)
    }

    /// Perform the compensating action
    async fn undo(&self, _context: &mut TaskContext) -> TaskResult<ActionOutcome> {
        Ok(ActionOutcome::Completed)
    }

    /// Whether the compensating action's effect is observable yet
    async fn undo_check(&self, _context: &TaskContext) -> TaskResult<bool> {
        Ok(true)
    }
}

/// Builds a fresh task for each step
pub type TaskFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

// ============================================================================
// Scripted Implementations for Testing
// ============================================================================

#[cfg(any(test, feature = "test-support"))]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Shared journal of every operation invoked, in order
    #[derive(Clone, Default)]
    pub struct CallLog {
        calls: Arc<Mutex<Vec<(String, Operation)>>>,
    }

    impl CallLog {
        pub fn new() -> Self {
            Self::default()
        }
        pub fn record(&self, label: &str, op: Operation) {
            self.calls.lock().unwrap().push((label.to_string(), op));
        }
        pub fn calls(&self) -> Vec<(String, Operation)> {
            self.calls.lock().unwrap().clone()
        }
        pub fn last(&self) -> Option<(String, Operation)> {
            self.calls.lock().unwrap().last().cloned()
        }
        pub fn len(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    /// Scripted reply for one invocation
    #[derive(Debug, Clone)]
    pub enum Reply<T> {
        Value(T),
        Fail(String),
        Panic(String),
    }

    /// Queued replies per operation; an exhausted queue falls back to the
    /// contract defaults (Completed / true)
    #[derive(Debug, Default)]
    pub struct Script {
        execute: VecDeque<Reply<ActionOutcome>>,
        check: VecDeque<Reply<bool>>,
        undo: VecDeque<Reply<ActionOutcome>>,
        undo_check: VecDeque<Reply<bool>>,
    }

    impl Script {
        pub fn new() -> Self {
            Self::default()
        }
        pub fn execute(mut self, outcome: ActionOutcome) -> Self {
            self.execute.push_back(Reply::Value(outcome));
            self
        }
        pub fn execute_fails(mut self, message: impl Into<String>) -> Self {
            self.execute.push_back(Reply::Fail(message.into()));
            self
        }
        pub fn execute_panics(mut self, message: impl Into<String>) -> Self {
            self.execute.push_back(Reply::Panic(message.into()));
            self
        }
        pub fn check(mut self, confirmed: bool) -> Self {
            self.check.push_back(Reply::Value(confirmed));
            self
        }
        pub fn undo(mut self, outcome: ActionOutcome) -> Self {
            self.undo.push_back(Reply::Value(outcome));
            self
        }
        pub fn undo_check(mut self, confirmed: bool) -> Self {
            self.undo_check.push_back(Reply::Value(confirmed));
            self
        }
    }

    fn resolve<T>(reply: Option<Reply<T>>, default: T) -> TaskResult<T> {
        match reply {
            None => Ok(default),
            Some(Reply::Value(v)) => Ok(v),
            Some(Reply::Fail(msg)) => Err(TaskError::Failed(msg)),
            Some(Reply::Panic(msg)) => panic!("{}", msg),
        }
    }

    /// Task whose replies come from a shared script.
    ///
    /// Actions stamp `"<label>.executed"` / `"<label>.undone"` into the
    /// context before replying, so context persistence is observable.
    pub struct ScriptedTask {
        label: String,
        log: CallLog,
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedTask {
        /// Factory sharing one script and log across every step
        pub fn factory(label: impl Into<String>, log: CallLog, script: Script) -> TaskFactory {
            let label = label.into();
            let script = Arc::new(Mutex::new(script));
            Arc::new(move || {
                Box::new(ScriptedTask {
                    label: label.clone(),
                    log: log.clone(),
                    script: Arc::clone(&script),
                }) as Box<dyn Task>
            })
        }
    }

    #[async_trait]
    impl Task for ScriptedTask {
        async fn execute(&self, context: &mut TaskContext) -> TaskResult<ActionOutcome> {
            self.log.record(&self.label, Operation::Execute);
            context.insert(format!("{}.executed", self.label), true);
            let reply = self.script.lock().unwrap().execute.pop_front();
            resolve(reply, ActionOutcome::Completed)
        }
        async fn check(&self, _context: &TaskContext) -> TaskResult<bool> {
            self.log.record(&self.label, Operation::Check);
            let reply = self.script.lock().unwrap().check.pop_front();
            resolve(reply, true)
        }
        async fn undo(&self, context: &mut TaskContext) -> TaskResult<ActionOutcome> {
            self.log.record(&self.label, Operation::Undo);
            context.insert(format!("{}.undone", self.label), true);
            let reply = self.script.lock().unwrap().undo.pop_front();
            resolve(reply, ActionOutcome::Completed)
        }
        async fn undo_check(&self, _context: &TaskContext) -> TaskResult<bool> {
            self.log.record(&self.label, Operation::UndoCheck);
            let reply = self.script.lock().unwrap().undo_check.pop_front();
            resolve(reply, true)
        }
    }
}
