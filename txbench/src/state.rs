use crate::rate::ArrivalGate;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Barrier, Notify};
use txbench_core::Phase;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Global lifecycle of one benchmark invocation. Transitions are monotonic
/// and driven only by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    ColdStart,
    Warmup,
    Measure,
    Done,
    Exit,
}

/// Immutable view published by the scheduler on every transition.
///
/// Lifecycle, phase, and gate always travel together, so a worker can never
/// observe a phase paired with a stale lifecycle.
pub(crate) struct Snapshot {
    pub lifecycle: Lifecycle,
    pub phase: Option<Arc<Phase>>,
    pub gate: Option<Arc<ArrivalGate>>,
}

/// The coordination object every worker polls: current snapshot, start
/// gate, done counter, and the serial-completion flag.
///
/// Only the scheduler publishes snapshots; workers read them and bump the
/// done counter (once each).
pub(crate) struct RunState {
    snapshot: ArcSwap<Snapshot>,
    start_barrier: Barrier,
    changed: Notify,
    done_count: AtomicUsize,
    serial_complete: AtomicBool,
    epoch: Instant,
    workers: usize,
}

impl RunState {
    pub fn new(workers: usize, epoch: Instant) -> Self {
        Self {
            snapshot: ArcSwap::new(Arc::new(Snapshot {
                lifecycle: Lifecycle::ColdStart,
                phase: None,
                gate: None,
            })),
            // Workers plus the scheduler, so nobody runs until everyone is
            // connected and the scheduler is ready to keep time.
            start_barrier: Barrier::new(workers + 1),
            changed: Notify::new(),
            done_count: AtomicUsize::new(0),
            serial_complete: AtomicBool::new(false),
            epoch,
            workers,
        }
    }

    /// Shared timestamp all latency offsets are relative to.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn load(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.snapshot.load().lifecycle
    }

    /// One-shot start gate. Every worker arrives exactly once (even when
    /// its connection failed) and the scheduler's arrival releases it.
    pub async fn block_for_start(&self) {
        self.start_barrier.wait().await;
    }

    /// Record that this worker will accept no more work. Callers guarantee
    /// at-most-once per worker.
    pub fn signal_done(&self) -> usize {
        let now = self.done_count.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(now <= self.workers);
        now
    }

    pub fn done_count(&self) -> usize {
        self.done_count.load(Ordering::Acquire)
    }

    /// Flag raised by the serial worker when its pass has no work left.
    pub fn signal_serial_complete(&self) {
        self.serial_complete.store(true, Ordering::Release);
    }

    /// Scheduler-only: read and clear the serial-completion flag.
    pub fn take_serial_complete(&self) -> bool {
        self.serial_complete.swap(false, Ordering::AcqRel)
    }

    /// Scheduler-only: publish a new snapshot and wake every parked worker.
    pub fn publish(
        &self,
        lifecycle: Lifecycle,
        phase: Option<Arc<Phase>>,
        gate: Option<Arc<ArrivalGate>>,
    ) {
        debug_assert!(lifecycle >= self.lifecycle());
        self.snapshot.store(Arc::new(Snapshot {
            lifecycle,
            phase,
            gate,
        }));
        self.changed.notify_waiters();
    }

    /// Wait until the published snapshot differs from `seen` in lifecycle
    /// or phase identity.
    pub async fn wait_for_change(&self, seen: &Snapshot) {
        loop {
            let notified = self.changed.notified();
            let now = self.load();
            if now.lifecycle != seen.lifecycle || phase_id(&now) != phase_id(seen) {
                return;
            }
            notified.await;
        }
    }

    /// Current lifecycle and phase for one worker, blocking while it has
    /// nothing to do: no phase published yet, a disabled phase, an inactive
    /// worker id, or an arrival gate with no permit. The snapshot is
    /// re-read after any block so the caller never acts on a stale pairing.
    pub async fn fetch_work(&self, worker: usize) -> Arc<Snapshot> {
        loop {
            // Register interest before loading, so a publish between the
            // load and the await still wakes us.
            let notified = self.changed.notified();
            let snap = self.load();

            if matches!(snap.lifecycle, Lifecycle::Done | Lifecycle::Exit) {
                return snap;
            }
            let Some(phase) = &snap.phase else {
                notified.await;
                continue;
            };
            if phase.is_disabled() || worker >= phase.active_workers() {
                notified.await;
                continue;
            }
            let Some(gate) = &snap.gate else {
                return snap;
            };
            tokio::select! {
                _ = gate.admit() => return self.load(),
                _ = notified => continue,
            }
        }
    }
}

fn phase_id(snapshot: &Snapshot) -> Option<usize> {
    snapshot.phase.as_ref().map(|p| p.id())
}
