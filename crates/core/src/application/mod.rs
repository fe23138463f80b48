// Application Layer - registry, stepping and the tick loop

pub mod registry;
pub mod runner;
pub mod stepper;

// Re-exports
pub use registry::TaskRegistry;
pub use runner::{
    shutdown_channel, CompensationRequest, Runner, RunnerConfig, RunnerHandle, ShutdownSender,
    ShutdownToken, TickReport,
};
pub use stepper::{QueueStepper, StepOutcome, StepPhase};
