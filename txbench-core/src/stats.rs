use crate::counts::TransactionCounts;
use crate::fault::{BackendFault, WorkError};
use crate::latency::Sample;
use std::io;
use std::time::Duration;

/// Why a worker was marked failed in the final report.
#[derive(Debug, thiserror::Error)]
pub enum FatalCause {
    /// Unrecognized backend fault escalated out of the retry loop.
    #[error(transparent)]
    Fault(#[from] BackendFault),
    /// The backend session could not be opened before the run started.
    #[error("connection setup failed: {0}")]
    Connect(WorkError),
    /// The worker task panicked or was cancelled.
    #[error("worker task died: {0}")]
    Died(String),
}

/// One fatally terminated worker and its cause.
#[derive(Debug)]
pub struct WorkerFailure {
    pub worker: usize,
    pub cause: FatalCause,
}

/// Aggregated outcome of one benchmark run.
///
/// A run always produces a report, even when workers failed: zero successes
/// with aborts points at the workload's business rules, zero successes with
/// failures points at the backend.
#[derive(Debug)]
pub struct RunReport {
    /// Length of the measurement window (MEASURE through DONE).
    pub elapsed: Duration,
    /// Per-type success/retry/abort tallies, merged across workers.
    pub counts: TransactionCounts,
    /// Every measured sample, merged across workers and sorted by start
    /// offset.
    pub samples: Vec<Sample>,
    /// Workers that terminated fatally, with their causes.
    pub failures: Vec<WorkerFailure>,
    /// Workers still busy at the join timeout and forcibly abandoned.
    pub abandoned: Vec<usize>,
}

impl RunReport {
    pub fn measured_requests(&self) -> usize {
        self.samples.len()
    }

    /// Measured requests per second over the measurement window.
    pub fn throughput(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.0;
        }
        self.samples.len() as f64 / self.elapsed.as_secs_f64()
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        LatencySummary::compute(&self.samples)
    }

    /// Per-sample CSV dump: type id, start offset, and latency in
    /// microseconds.
    pub fn write_samples_csv<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "transaction type,start time (us),latency (us)")?;
        for s in &self.samples {
            writeln!(
                out,
                "{},{},{}",
                s.tx_id,
                (s.start_ns + 500) / 1_000,
                (s.end_ns.saturating_sub(s.start_ns) + 500) / 1_000
            )?;
        }
        Ok(())
    }
}

/// Distribution of measured latencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: usize,
    pub average: Duration,
    pub minimum: Duration,
    pub p25: Duration,
    pub median: Duration,
    pub p75: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub maximum: Duration,
}

impl LatencySummary {
    pub fn compute(samples: &[Sample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut latencies: Vec<u64> = samples
            .iter()
            .map(|s| s.end_ns.saturating_sub(s.start_ns))
            .collect();
        latencies.sort_unstable();

        let count = latencies.len();
        let pct = |q: f64| {
            let idx = ((count as f64 * q) as usize).min(count - 1);
            Duration::from_nanos(latencies[idx])
        };
        let total: u64 = latencies.iter().sum();

        Some(Self {
            count,
            average: Duration::from_nanos(total / count as u64),
            minimum: Duration::from_nanos(latencies[0]),
            p25: pct(0.25),
            median: pct(0.50),
            p75: pct(0.75),
            p90: pct(0.90),
            p95: pct(0.95),
            p99: pct(0.99),
            maximum: Duration::from_nanos(latencies[count - 1]),
        })
    }
}
