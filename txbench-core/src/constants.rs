use std::time::Duration;

/// Cadence of the scheduler's control loop.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(25);

/// Cap on outstanding arrival permits while a phase is rate limited. A
/// backend that cannot keep up never banks more than this much work.
pub const ARRIVAL_QUEUE_LIMIT: usize = 10_000;

/// Default grace period for workers to wind down after the run exits.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(60);
