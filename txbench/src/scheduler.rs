use crate::rate::ArrivalGate;
use crate::state::{Lifecycle, RunState};
use crate::worker::{Worker, WorkerOutput};
use crate::workload::Workload;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use txbench_core::{
    ConfigError, FatalCause, FaultTable, Phase, RunReport, TransactionCounts,
    TransactionRegistry, WorkerFailure, BenchConfig, MONITOR_INTERVAL,
};
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Top-level driver for one benchmark invocation.
///
/// Validates the configuration, launches one worker per configured client,
/// advances the run through its phases on a monitoring tick, and aggregates
/// every worker's counters and latency record into a [`RunReport`].
pub struct Bench<W: Workload> {
    workload: Arc<W>,
    config: BenchConfig,
    faults: Arc<FaultTable>,
    aborted: Arc<AtomicBool>,
}

/// Cloneable handle that forces the run to EXIT on its next tick.
///
/// Pending backend work is left to finish or fail on its own; whatever is
/// in flight when the forced exit lands is not measured.
#[derive(Clone)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }
}

impl<W: Workload> Bench<W> {
    pub fn new(workload: W, config: BenchConfig) -> Self {
        Self {
            workload: Arc::new(workload),
            config,
            faults: Arc::new(FaultTable::builtin()),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the builtin transient-fault table.
    pub fn fault_table(mut self, table: FaultTable) -> Self {
        self.faults = Arc::new(table);
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            aborted: Arc::clone(&self.aborted),
        }
    }

    /// Run the benchmark to completion. Configuration problems fail here,
    /// before any worker launches; everything after that ends in a report.
    #[instrument(name = "bench", skip_all, fields(workers = self.config.workers))]
    pub async fn run(self) -> Result<RunReport, ConfigError> {
        let registry = Arc::new(TransactionRegistry::new(self.workload.transactions())?);
        let phases = self.config.build_phases(&registry)?;
        info!(
            phases = phases.len(),
            types = registry.selectable_count(),
            "configuration validated"
        );

        let state = Arc::new(RunState::new(self.config.workers, Instant::now()));
        let handles: Vec<(usize, JoinHandle<WorkerOutput>)> = (0..self.config.workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&self.workload),
                    Arc::clone(&registry),
                    Arc::clone(&state),
                    Arc::clone(&self.faults),
                    self.config.retry_limit,
                );
                (id, tokio::spawn(worker.run()))
            })
            .collect();

        // Releases every worker blocked on the start gate.
        state.block_for_start().await;
        let window = self.control_loop(&state, &phases).await;
        Ok(self.join_workers(handles, window).await)
    }

    /// The timing loop: advance phases over wall-clock time, drive the
    /// lifecycle to DONE when the plan is exhausted, and to EXIT once every
    /// worker has signaled. Returns the measured window.
    async fn control_loop(&self, state: &Arc<RunState>, phases: &[Arc<Phase>]) -> Duration {
        let mut iter = phases.iter();
        let mut pacer: Option<JoinHandle<()>> = None;

        let mut current = next_runnable(&mut iter).cloned();
        let mut lifecycle = match (&current, self.config.warmup) {
            (Some(_), Some(_)) => Lifecycle::Warmup,
            (Some(_), None) => Lifecycle::Measure,
            (None, _) => Lifecycle::Done,
        };
        let mut gate = match &current {
            Some(phase) => activate(state, lifecycle, phase, &mut pacer),
            None => {
                info!("no runnable phases; nothing to measure");
                state.publish(Lifecycle::Done, None, None);
                None
            }
        };

        let run_start = Instant::now();
        let mut phase_start = run_start;
        let mut measure_start = run_start;
        let mut measure_end = run_start;

        let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let now = Instant::now();

            if self.aborted.load(Ordering::Acquire) {
                warn!("run aborted by operator; forcing exit");
                if lifecycle == Lifecycle::Measure {
                    measure_end = now;
                }
                if let Some(pacer) = pacer.take() {
                    pacer.abort();
                }
                state.publish(Lifecycle::Exit, None, None);
                break;
            }

            // Every worker gone (e.g. all failed fatally) ends the run; no
            // amount of waiting will produce more work.
            if lifecycle < Lifecycle::Done && state.done_count() >= self.config.workers {
                info!("all workers stopped; ending run early");
                if lifecycle == Lifecycle::Measure {
                    measure_end = now;
                }
                lifecycle = Lifecycle::Done;
                if let Some(pacer) = pacer.take() {
                    pacer.abort();
                }
                state.publish(Lifecycle::Done, None, None);
                continue;
            }

            match lifecycle {
                Lifecycle::Warmup => {
                    let warmup = self.config.warmup.unwrap_or_default();
                    if now >= run_start + warmup {
                        info!("warm-up complete; measurement begins");
                        lifecycle = Lifecycle::Measure;
                        measure_start = now;
                        // The phase clock restarts so warm-up work is free.
                        phase_start = now;
                        state.take_serial_complete();
                        if let Some(phase) = &current {
                            state.publish(Lifecycle::Measure, Some(Arc::clone(phase)), gate.clone());
                        }
                    }
                }
                Lifecycle::Measure => {
                    let Some(phase) = current.clone() else {
                        continue;
                    };
                    let over = match phase.duration() {
                        Some(duration) => now >= phase_start + duration,
                        None => state.take_serial_complete(),
                    };
                    if !over {
                        continue;
                    }

                    if let Some(pacer) = pacer.take() {
                        pacer.abort();
                    }
                    current = next_runnable(&mut iter).cloned();
                    match &current {
                        Some(next) => {
                            state.take_serial_complete();
                            gate = activate(state, Lifecycle::Measure, next, &mut pacer);
                            phase_start = Instant::now();
                        }
                        None => {
                            info!("all phases complete; draining workers");
                            measure_end = now;
                            lifecycle = Lifecycle::Done;
                            state.publish(Lifecycle::Done, None, None);
                        }
                    }
                }
                Lifecycle::Done => {
                    if state.done_count() >= self.config.workers {
                        debug!("every worker signaled done; exiting");
                        state.publish(Lifecycle::Exit, None, None);
                        break;
                    }
                }
                Lifecycle::ColdStart | Lifecycle::Exit => break,
            }
        }

        measure_end.saturating_duration_since(measure_start)
    }

    /// Join every worker under the global timeout, merging counters and
    /// latency records; stragglers are aborted and reported as abandoned.
    async fn join_workers(
        &self,
        handles: Vec<(usize, JoinHandle<WorkerOutput>)>,
        window: Duration,
    ) -> RunReport {
        let deadline = tokio::time::Instant::now() + self.config.join_timeout;

        let mut counts = TransactionCounts::default();
        let mut samples = Vec::new();
        let mut failures = Vec::new();
        let mut abandoned = Vec::new();

        for (id, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(output)) => {
                    counts.merge(&output.counts);
                    samples.extend(output.latencies.into_samples());
                    if let Some(cause) = output.failure {
                        failures.push(WorkerFailure { worker: id, cause });
                    }
                }
                Ok(Err(err)) => {
                    error!(worker = id, %err, "worker task died");
                    failures.push(WorkerFailure {
                        worker: id,
                        cause: FatalCause::Died(err.to_string()),
                    });
                }
                Err(_) => {
                    warn!(worker = id, "worker still busy at the join timeout; abandoning");
                    handle.abort();
                    abandoned.push(id);
                }
            }
        }

        samples.sort_unstable();
        if !failures.is_empty() {
            warn!(failed = failures.len(), "run finished with failed workers");
        }
        info!(
            elapsed = %humantime::format_duration(window),
            measured = samples.len(),
            "run complete"
        );

        RunReport {
            elapsed: window,
            counts,
            samples,
            failures,
            abandoned,
        }
    }
}

/// Next phase that actually runs; disabled phases are announced and
/// skipped.
fn next_runnable<'a>(iter: &mut std::slice::Iter<'a, Arc<Phase>>) -> Option<&'a Arc<Phase>> {
    for phase in iter {
        if phase.is_disabled() {
            info!(phase = phase.id(), "phase disabled; skipping");
            continue;
        }
        return Some(phase);
    }
    None
}

/// Publish `phase` with its arrival gate, announcing the transition the way
/// the driver has always logged phase starts.
fn activate(
    state: &RunState,
    lifecycle: Lifecycle,
    phase: &Arc<Phase>,
    pacer: &mut Option<JoinHandle<()>>,
) -> Option<Arc<ArrivalGate>> {
    let (gate, task) = match ArrivalGate::for_phase(phase) {
        Some((gate, task)) => (Some(gate), task),
        None => (None, None),
    };
    *pacer = task;

    let duration = phase
        .duration()
        .map(|d| humantime::format_duration(d).to_string())
        .unwrap_or_else(|| "serial".to_string());
    info!(
        phase = phase.id(),
        duration = %duration,
        rate = ?phase.rate(),
        arrival = ?phase.arrival(),
        active = phase.active_workers(),
        serial = phase.is_serial(),
        "starting phase"
    );

    state.publish(lifecycle, Some(Arc::clone(phase)), gate.clone());
    gate
}
