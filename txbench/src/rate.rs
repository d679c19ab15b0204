use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use txbench_core::{Arrival, Phase, Rate, ARRIVAL_QUEUE_LIMIT};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Admission control for one rate-limited phase.
///
/// Swapped wholesale on every phase transition; a worker waits on the gate
/// of the snapshot it loaded, never on a gate belonging to another phase.
pub(crate) enum ArrivalGate {
    /// Evenly spaced arrivals at the phase rate.
    Uniform(DefaultDirectRateLimiter),
    /// Poisson arrivals; permits are minted by a pacer task.
    Poisson(Semaphore),
}

impl ArrivalGate {
    /// Gate for the phase plus its pacer task, or `None` when the phase is
    /// not rate limited.
    pub fn for_phase(phase: &Phase) -> Option<(Arc<Self>, Option<JoinHandle<()>>)> {
        let Rate::Limited(rate) = phase.rate() else {
            return None;
        };
        match phase.arrival() {
            Arrival::Regular => Some((Arc::new(Self::Uniform(rate_limiter(rate))), None)),
            Arrival::Poisson => {
                let gate = Arc::new(Self::Poisson(Semaphore::new(0)));
                let pacer = tokio::spawn(pace(Arc::clone(&gate), rate));
                Some((gate, Some(pacer)))
            }
        }
    }

    /// Wait for the next arrival slot.
    pub async fn admit(&self) {
        match self {
            Self::Uniform(limiter) => limiter.until_ready().await,
            Self::Poisson(sem) => match sem.acquire().await {
                Ok(permit) => permit.forget(),
                // Closed semaphores never grant; park until the caller is
                // woken by the next transition.
                Err(_) => std::future::pending().await,
            },
        }
    }
}

fn rate_limiter(rate: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(rate).allow_burst(NonZeroU32::new(1).unwrap()))
}

/// Mint one permit per exponential inter-arrival gap. The backlog is capped
/// so a stalled backend cannot bank unbounded work.
async fn pace(gate: Arc<ArrivalGate>, rate: NonZeroU32) {
    let ArrivalGate::Poisson(sem) = &*gate else {
        return;
    };
    let gaps = Exp::new(f64::from(rate.get())).expect("rate is positive");
    let mut rng = SmallRng::from_entropy();
    loop {
        let gap = Duration::from_secs_f64(gaps.sample(&mut rng));
        tokio::time::sleep(gap).await;
        if sem.available_permits() < ARRIVAL_QUEUE_LIMIT {
            sem.add_permits(1);
        }
    }
}
