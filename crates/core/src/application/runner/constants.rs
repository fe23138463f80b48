// Runner constants (no magic values)
use std::time::Duration;

/// Pause between the end of one tick and the start of the next (1s)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Per-tick chance that a forward instance is flipped to compensation
pub const DEFAULT_REVERSAL_PROBABILITY: f64 = 0.1;
