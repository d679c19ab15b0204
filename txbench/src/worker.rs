use crate::state::{Lifecycle, RunState};
use crate::workload::{Connection, Workload};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;
use txbench_core::{
    BackendFault, FatalCause, FaultTable, LatencyRecord, Phase, TransactionCounts,
    TransactionRegistry, TransactionStatus, TypeId, WorkError,
};
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

/// One simulated client: owns one backend session and drives transactions
/// against it until the run exits.
pub(crate) struct Worker<W: Workload> {
    id: usize,
    workload: Arc<W>,
    registry: Arc<TransactionRegistry>,
    state: Arc<RunState>,
    faults: Arc<FaultTable>,
    retry_limit: Option<u32>,
    counts: TransactionCounts,
    latencies: LatencyRecord,
    rng: SmallRng,
    serial_cursor: usize,
    last_phase: Option<(usize, Lifecycle)>,
    seen_done: bool,
}

/// Everything a worker hands back when it stops.
pub(crate) struct WorkerOutput {
    pub counts: TransactionCounts,
    pub latencies: LatencyRecord,
    pub failure: Option<FatalCause>,
}

impl<W: Workload> Worker<W> {
    pub fn new(
        id: usize,
        workload: Arc<W>,
        registry: Arc<TransactionRegistry>,
        state: Arc<RunState>,
        faults: Arc<FaultTable>,
        retry_limit: Option<u32>,
    ) -> Self {
        let counts = TransactionCounts::for_registry(&registry);
        let latencies = LatencyRecord::new(state.epoch());
        Self {
            id,
            workload,
            registry,
            state,
            faults,
            retry_limit,
            counts,
            latencies,
            rng: SmallRng::from_entropy(),
            serial_cursor: 0,
            last_phase: None,
            seen_done: false,
        }
    }

    #[instrument(name = "worker", skip_all, fields(id = self.id))]
    pub async fn run(mut self) -> WorkerOutput {
        let setup = self.connect().await;

        // Arrive at the barrier even when the connection failed; the start
        // gate's arity must hold for the run to begin at all.
        self.state.block_for_start().await;

        let mut conn = match setup {
            Ok(conn) => conn,
            Err(err) => {
                error!(%err, "failed to open backend session");
                return self.finish(Some(FatalCause::Connect(err)));
            }
        };

        let failure = match self.drive(&mut conn).await {
            Ok(()) => None,
            Err(fault) => {
                error!(%fault, "worker terminating on unrecognized backend fault");
                Some(FatalCause::Fault(fault))
            }
        };

        self.workload.teardown(&mut conn, self.id).await;
        conn.close().await;
        trace!("worker stopped");
        self.finish(failure)
    }

    async fn connect(&mut self) -> Result<W::Conn, WorkError> {
        let mut conn = self.workload.connect(self.id).await?;
        self.workload.setup(&mut conn, self.id).await?;
        debug!("backend session open");
        Ok(conn)
    }

    /// Signal done exactly once on the way out, whatever path got us here,
    /// so the scheduler's exit handshake stays live.
    fn finish(mut self, failure: Option<FatalCause>) -> WorkerOutput {
        if !self.seen_done {
            self.seen_done = true;
            self.state.signal_done();
        }
        WorkerOutput {
            counts: self.counts,
            latencies: self.latencies,
            failure,
        }
    }

    /// The run loop: poll the shared state, execute transactions with
    /// retry, and record a latency sample for every attempt completed while
    /// the loaded lifecycle was MEASURE.
    async fn drive(&mut self, conn: &mut W::Conn) -> Result<(), BackendFault> {
        let mut snap = self.state.load();
        loop {
            // Unlimited phases never hit a pending await; pay into the coop
            // budget so the scheduler's timer keeps running.
            tokio::task::consume_budget().await;

            match snap.lifecycle {
                Lifecycle::Exit => break,
                Lifecycle::Done => {
                    if !self.seen_done {
                        self.seen_done = true;
                        self.state.signal_done();
                    }
                    break;
                }
                _ => {}
            }

            // May block on the arrival gate; comes back with a fresh
            // snapshot either way.
            snap = self.state.fetch_work(self.id).await;
            let Some(phase) = snap.phase.clone() else {
                continue;
            };
            self.observe_phase(&phase, snap.lifecycle);

            let measure = snap.lifecycle == Lifecycle::Measure;
            let start = measure.then(Instant::now);

            match self.do_work(conn, &phase).await? {
                Some(tx_id) => {
                    if let Some(start) = start {
                        let end = Instant::now();
                        self.latencies.add_latency(tx_id, start, end);
                        #[cfg(feature = "metrics")]
                        metrics::histogram!("txbench_latency")
                            .record((end - start).as_nanos() as f64);
                    }
                }
                None => {
                    // Serial pass exhausted: report it and park until the
                    // scheduler moves the run along.
                    debug!(phase = phase.id(), "serial pass complete");
                    self.state.signal_serial_complete();
                    self.state.wait_for_change(&snap).await;
                }
            }

            snap = self.state.load();
        }
        Ok(())
    }

    /// Reset the serial cursor whenever the phase changes, and again at the
    /// warm-up edge so the measured pass starts from the top.
    fn observe_phase(&mut self, phase: &Phase, lifecycle: Lifecycle) {
        let key = (phase.id(), lifecycle);
        if self.last_phase != Some(key) {
            self.last_phase = Some(key);
            self.serial_cursor = 0;
        }
    }

    /// Execute one transaction with retry, returning the id of the type
    /// that completed (committed or user-aborted), or `None` when a serial
    /// pass has no work left.
    async fn do_work(
        &mut self,
        conn: &mut W::Conn,
        phase: &Phase,
    ) -> Result<Option<TypeId>, BackendFault> {
        let registry = Arc::clone(&self.registry);
        let mut next = None;
        let mut attempts = 0u32;
        loop {
            tokio::task::consume_budget().await;

            let tx = match next {
                Some(tx) => tx,
                None => {
                    attempts = 0;
                    let Some(slot) = self.choose_slot(phase) else {
                        return Ok(None);
                    };
                    let tx = registry
                        .selectable(slot)
                        .expect("phase weights are validated against the registry");
                    debug_assert!(
                        !tx.is_supplemental(),
                        "selected a supplemental transaction"
                    );
                    next = Some(tx);
                    tx
                }
            };

            match self.workload.execute(conn, tx).await {
                Ok(TransactionStatus::Success) => {
                    self.counts.record_success(tx.id());
                    trace!(tx = tx.name(), "transaction committed");
                    #[cfg(feature = "metrics")]
                    metrics::counter!("txbench_success", "type" => tx.name().to_owned())
                        .increment(1);
                    return Ok(Some(tx.id()));
                }
                Ok(TransactionStatus::Retry) => {
                    if self.over_retry_limit(&mut attempts) {
                        self.counts.record_retry(tx.id());
                        next = None;
                    }
                }
                Ok(TransactionStatus::RetryDifferent) => {
                    self.counts.record_retry(tx.id());
                    next = None;
                }
                Err(WorkError::UserAbort(reason)) => {
                    conn.rollback().await?;
                    self.counts.record_abort(tx.id());
                    debug!(tx = tx.name(), %reason, "transaction aborted by workload");
                    #[cfg(feature = "metrics")]
                    metrics::counter!("txbench_abort", "type" => tx.name().to_owned())
                        .increment(1);
                    return Ok(Some(tx.id()));
                }
                Err(WorkError::Backend(fault)) => {
                    conn.rollback().await?;
                    if self.faults.is_transient(&fault) {
                        debug!(
                            tx = tx.name(),
                            code = fault.code,
                            state = %fault.state,
                            "transient backend fault; retrying"
                        );
                        if self.over_retry_limit(&mut attempts) {
                            self.counts.record_retry(tx.id());
                            next = None;
                        }
                    } else {
                        warn!(
                            tx = tx.name(),
                            code = fault.code,
                            state = %fault.state,
                            "unrecognized backend fault"
                        );
                        return Err(fault);
                    }
                }
            }
        }
    }

    /// Next weight slot for this phase: weighted random, or the
    /// worker-local serial cursor (wrapping only when the phase is timed).
    fn choose_slot(&mut self, phase: &Phase) -> Option<usize> {
        if !phase.is_serial() {
            return phase.choose(&mut self.rng);
        }
        match phase.serial_slot(self.serial_cursor) {
            Some(slot) => {
                self.serial_cursor = slot + 1;
                Some(slot)
            }
            None if phase.is_timed() => {
                let slot = phase.serial_slot(0)?;
                self.serial_cursor = slot + 1;
                Some(slot)
            }
            None => None,
        }
    }

    /// Bump the consecutive-retry counter for the current selection; true
    /// once the configured ceiling is exhausted, which abandons the
    /// selection the way RETRY_DIFFERENT does.
    fn over_retry_limit(&self, attempts: &mut u32) -> bool {
        *attempts += 1;
        match self.retry_limit {
            Some(limit) => *attempts > limit,
            None => false,
        }
    }
}
