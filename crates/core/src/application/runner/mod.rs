// Runner - tick loop over the durable active-queue set

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::registry::TaskRegistry;
use crate::application::stepper::QueueStepper;
use crate::domain::{ActiveQueue, InstanceId, QueueInstance, TaskContext};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, ReversalPolicy, SnapshotStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Delay between the end of one tick and the start of the next
    pub tick_interval: Duration,
    /// Optional bound on a single task operation (none = wait forever).
    ///
    /// A timed-out operation is aborted at its next await point only; work
    /// already handed to the blocking pool (`tokio::fs`, `spawn_blocking`)
    /// keeps running and may overlap the next instance's operation.
    pub step_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            step_timeout: None,
        }
    }
}

/// Counters for one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records read from the snapshot
    pub loaded: usize,
    /// Instances dropped (unresolvable definition, bad cursor, unknown task)
    pub dropped: usize,
    /// Forward instances flipped to compensation this tick
    pub reversed: usize,
    /// Instances that completed one transition
    pub stepped: usize,
    /// Instances whose task operation failed (kept at their previous state)
    pub failed: usize,
    /// Instances that drained and left the active set
    pub finished: usize,
    /// Newly admitted instances merged in
    pub admitted: usize,
    /// Size of the snapshot written
    pub persisted: usize,
}

/// Result of a compensation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationRequest {
    /// The instance had not started yet and was withdrawn from admission
    Withdrawn,
    /// The instance will be flipped at the start of the next tick
    Queued,
}

/// Owns the active-queue set and advances every queue one step per tick
pub struct Runner {
    store: Arc<dyn SnapshotStore>,
    registry: Arc<TaskRegistry>,
    stepper: QueueStepper,
    reversal: Arc<dyn ReversalPolicy>,
    id_provider: Arc<dyn IdProvider>,
    config: RunnerConfig,
    pending: Mutex<Vec<QueueInstance>>,
    compensation_requests: Mutex<HashSet<InstanceId>>,
    tick_lock: Mutex<()>,
}

impl Runner {
    pub fn new(
        registry: Arc<TaskRegistry>,
        store: Arc<dyn SnapshotStore>,
        reversal: Arc<dyn ReversalPolicy>,
        id_provider: Arc<dyn IdProvider>,
        config: RunnerConfig,
    ) -> Self {
        let stepper = QueueStepper::new(Arc::clone(&registry), config.step_timeout);
        Self {
            store,
            registry,
            stepper,
            reversal,
            id_provider,
            config,
            pending: Mutex::new(Vec::new()),
            compensation_requests: Mutex::new(HashSet::new()),
            tick_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Admit a new instance; it joins the active set at the end of the
    /// next tick and is first stepped on the tick after that
    ///
    /// # Errors
    /// `AppError::Domain(UnknownDefinition)` if `definition_id` is not registered
    pub async fn admit(
        &self,
        definition_id: impl Into<String>,
        context: TaskContext,
    ) -> Result<InstanceId> {
        let definition_id = definition_id.into();
        self.registry.definition(&definition_id)?;

        let instance_id = self.id_provider.generate_id();
        let instance = QueueInstance::new(instance_id.clone(), definition_id.clone(), context);
        self.pending.lock().await.push(instance);

        info!(
            instance_id = %instance_id,
            definition_id = %definition_id,
            "Queue instance admitted"
        );
        Ok(instance_id)
    }

    /// Ask for an instance to start compensating.
    ///
    /// Instances still waiting for admission are simply withdrawn; active
    /// ones are flipped to backward at the start of the next tick.
    pub async fn request_compensation(&self, instance_id: &str) -> CompensationRequest {
        {
            let mut pending = self.pending.lock().await;
            if let Some(pos) = pending.iter().position(|i| i.instance_id == instance_id) {
                pending.remove(pos);
                info!(instance_id = %instance_id, "Pending instance withdrawn");
                return CompensationRequest::Withdrawn;
            }
        }

        self.compensation_requests
            .lock()
            .await
            .insert(instance_id.to_string());
        info!(instance_id = %instance_id, "Compensation requested");
        CompensationRequest::Queued
    }

    /// Number of instances waiting for admission
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Run one tick: load, reverse, step all, collect, merge, persist
    ///
    /// # Errors
    /// Only a failed snapshot write is returned; every other failure is
    /// isolated to the instance it concerns.
    pub async fn run_tick(&self) -> Result<TickReport> {
        let _tick = self.tick_lock.lock().await;
        let mut report = TickReport::default();

        // 1. Load + resolve
        let loaded = match self.store.load_snapshot().await {
            Ok(instances) => instances,
            Err(e) => {
                error!(
                    error = %e,
                    "Failed to load snapshot, no instances resume this tick"
                );
                Vec::new()
            }
        };
        report.loaded = loaded.len();

        let mut queues = Vec::with_capacity(loaded.len());
        for instance in loaded {
            let instance_id = instance.instance_id.clone();
            let definition_id = instance.definition_id.clone();
            match self.registry.resolve(instance) {
                Ok(queue) => queues.push(queue),
                Err(e) => {
                    error!(
                        instance_id = %instance_id,
                        definition_id = %definition_id,
                        error = %e,
                        "Dropping unresolvable queue instance"
                    );
                    report.dropped += 1;
                }
            }
        }

        // 2. Compensation injection
        let (reversed, consumed_requests) = self.apply_reversals(&mut queues).await;
        report.reversed = reversed;

        // 3-4. Step sequentially, keep the unfinished ones
        let mut survivors = Vec::with_capacity(queues.len());
        for mut queue in queues {
            let before = queue.instance().clone();
            match self.stepper.step(&mut queue).await {
                Ok(_) => {
                    report.stepped += 1;
                    if queue.is_finished() {
                        report.finished += 1;
                        info!(
                            instance_id = %queue.instance().instance_id,
                            definition_id = %queue.instance().definition_id,
                            direction = %queue.instance().direction,
                            "Queue instance finished"
                        );
                    } else {
                        survivors.push(queue.into_instance());
                    }
                }
                Err(AppError::Task(e)) => {
                    warn!(
                        instance_id = %before.instance_id,
                        error = %e,
                        "Step failed, instance keeps its previous state"
                    );
                    report.failed += 1;
                    survivors.push(before);
                }
                Err(e) => {
                    error!(
                        instance_id = %before.instance_id,
                        definition_id = %before.definition_id,
                        error = %e,
                        "Dropping queue instance"
                    );
                    report.dropped += 1;
                }
            }
        }

        // 5. Merge admissions
        let admitted = std::mem::take(&mut *self.pending.lock().await);
        report.admitted = admitted.len();
        survivors.extend(admitted.iter().cloned());

        // 6. Persist
        if let Err(e) = self.store.save_snapshot(&survivors).await {
            error!(error = %e, "Failed to persist snapshot");
            // Put admissions back ahead of anything admitted meanwhile
            {
                let mut pending = self.pending.lock().await;
                let newer = std::mem::replace(&mut *pending, admitted);
                pending.extend(newer);
            }
            // The flips were never written; request them again
            self.compensation_requests
                .lock()
                .await
                .extend(consumed_requests);
            return Err(e);
        }
        report.persisted = survivors.len();

        info!(
            loaded = report.loaded,
            dropped = report.dropped,
            reversed = report.reversed,
            stepped = report.stepped,
            failed = report.failed,
            finished = report.finished,
            admitted = report.admitted,
            persisted = report.persisted,
            "Tick complete"
        );
        Ok(report)
    }

    /// Flip requested instances and let the policy flip the others.
    ///
    /// Returns the number of flips and the requests that matched an active
    /// instance, so they can be restored if the snapshot write fails.
    async fn apply_reversals(&self, queues: &mut [ActiveQueue]) -> (usize, Vec<InstanceId>) {
        let mut requested = std::mem::take(&mut *self.compensation_requests.lock().await);
        let mut consumed = Vec::new();
        let mut reversed = 0;

        for queue in queues.iter_mut() {
            let was_requested = requested.remove(&queue.instance().instance_id);
            if was_requested {
                consumed.push(queue.instance().instance_id.clone());
            }
            if queue.instance().direction.is_backward() {
                continue;
            }
            if !was_requested && !self.reversal.should_reverse(queue.instance()) {
                continue;
            }
            if queue.reverse() {
                reversed += 1;
                info!(
                    instance_id = %queue.instance().instance_id,
                    cursor = queue.instance().cursor,
                    requested = was_requested,
                    "Queue instance reversed"
                );
            }
        }

        if !requested.is_empty() {
            // Requested while its admission was in flight and returned to pending
            let mut pending = self.pending.lock().await;
            pending.retain(|instance| {
                let withdrawn = requested.remove(&instance.instance_id);
                if withdrawn {
                    info!(instance_id = %instance.instance_id, "Pending instance withdrawn");
                }
                !withdrawn
            });
        }

        for instance_id in requested {
            warn!(
                instance_id = %instance_id,
                "Compensation requested for an instance that is not active"
            );
        }
        (reversed, consumed)
    }

    /// Tick until `shutdown` fires. The first tick runs immediately; each
    /// later tick is scheduled only after the previous one persisted.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            "Runner started"
        );
        loop {
            if shutdown.is_shutdown() {
                break;
            }

            if let Err(e) = self.run_tick().await {
                error!(error = %e, "Tick failed");
            }

            tokio::select! {
                _ = sleep(self.config.tick_interval) => {},
                _ = shutdown.wait() => break,
            }
        }
        info!("Runner stopped");
    }

    /// Spawn the tick loop.
    ///
    /// The loop runs until `RunnerHandle::stop` is called; dropping the
    /// handle detaches the loop without stopping it.
    pub fn start(self: &Arc<Self>) -> RunnerHandle {
        let (shutdown, token) = shutdown_channel();
        let runner = Arc::clone(self);
        let join = tokio::spawn(async move { runner.run(token).await });
        RunnerHandle { shutdown, join }
    }
}

/// Handle for a started runner
pub struct RunnerHandle {
    shutdown: ShutdownSender,
    join: JoinHandle<()>,
}

impl RunnerHandle {
    /// Cancel the next scheduled tick; an in-flight tick runs to completion
    pub fn stop(&self) {
        self.shutdown.shutdown();
    }

    /// Stop and wait for the loop to exit
    pub async fn stop_and_wait(self) -> Result<()> {
        self.stop();
        self.join
            .await
            .map_err(|e| AppError::Internal(format!("runner loop failed: {}", e)))
    }
}
