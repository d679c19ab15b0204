use crate::constants::DEFAULT_JOIN_TIMEOUT;
use crate::phase::{Arrival, Phase, Rate};
use crate::types::TransactionRegistry;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, warn};

/// Fatal configuration problems, all detected before any worker launches.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("benchmark requires at least one worker")]
    NoWorkers,
    #[error("no phases configured")]
    NoPhases,
    #[error("no transaction types declared")]
    NoTransactions,
    #[error("every transaction type is supplemental; nothing is selectable")]
    NoSelectableTransactions,
    #[error("duplicate transaction type `{0}`")]
    DuplicateTransaction(String),
    #[error("phase {phase}: expected {expected} weights for the selectable transaction types, got {actual}")]
    WeightCountMismatch {
        phase: usize,
        expected: usize,
        actual: usize,
    },
    #[error("phase {phase}: weights must be non-negative with a positive total")]
    BadWeights { phase: usize },
    #[error("phase {phase}: rate must be at least 1; use \"unlimited\" or \"disabled\" instead")]
    ZeroRate { phase: usize },
    #[error("phase {phase}: rate must be a number, \"unlimited\" or \"disabled\", got `{value}`")]
    BadRate { phase: usize, value: String },
    #[error("phase {phase}: untimed phases must be serial")]
    UntimedNotSerial { phase: usize },
    #[error("phase {phase}: active_workers must be at least 1")]
    NoActiveWorkers { phase: usize },
}

/// Rate field as written in a phase plan: a number, "unlimited" or
/// "disabled".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateSpec {
    PerSecond(u32),
    Named(String),
}

impl Default for RateSpec {
    fn default() -> Self {
        RateSpec::Named("unlimited".to_string())
    }
}

impl RateSpec {
    fn resolve(&self, phase: usize) -> Result<Rate, ConfigError> {
        match self {
            RateSpec::PerSecond(n) => NonZeroU32::new(*n)
                .map(Rate::Limited)
                .ok_or(ConfigError::ZeroRate { phase }),
            RateSpec::Named(name) if name == "unlimited" => Ok(Rate::Unlimited),
            RateSpec::Named(name) if name == "disabled" => Ok(Rate::Disabled),
            RateSpec::Named(name) => Err(ConfigError::BadRate {
                phase,
                value: name.clone(),
            }),
        }
    }
}

/// One entry of the phase plan.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Wall-clock length of the phase. Unset means a single serial pass.
    #[serde_as(as = "Option<DurationSeconds>")]
    #[serde(default)]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub rate: RateSpec,
    #[serde(default)]
    pub arrival: Arrival,
    /// Workers active during this phase; defaults to every worker.
    #[serde(default)]
    pub active_workers: Option<usize>,
    /// Execute the weight slots in order instead of sampling them.
    #[serde(default)]
    pub serial: bool,
    /// One weight per selectable transaction type, in catalog order.
    pub weights: Vec<f64>,
}

impl PhaseConfig {
    /// A timed phase with no rate gating.
    pub fn timed(duration: Duration, weights: Vec<f64>) -> Self {
        Self {
            duration: Some(duration),
            rate: RateSpec::default(),
            arrival: Arrival::default(),
            active_workers: None,
            serial: false,
            weights,
        }
    }

    /// An untimed serial pass over the positive-weight slots.
    pub fn serial(weights: Vec<f64>) -> Self {
        Self {
            duration: None,
            rate: RateSpec::default(),
            arrival: Arrival::default(),
            active_workers: None,
            serial: true,
            weights,
        }
    }

    pub fn rate(mut self, per_second: u32) -> Self {
        self.rate = RateSpec::PerSecond(per_second);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.rate = RateSpec::Named("disabled".to_string());
        self
    }

    pub fn poisson(mut self) -> Self {
        self.arrival = Arrival::Poisson;
        self
    }

    pub fn active_workers(mut self, active: usize) -> Self {
        self.active_workers = Some(active);
        self
    }
}

/// A validated-on-build description of one benchmark invocation.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Number of simulated clients. Each owns one backend session.
    pub workers: usize,
    /// Optional warm-up window before measurement begins.
    #[serde_as(as = "Option<DurationSeconds>")]
    #[serde(default)]
    pub warmup: Option<Duration>,
    /// Ceiling on consecutive retries of one selection; unlimited when
    /// unset.
    #[serde(default)]
    pub retry_limit: Option<u32>,
    /// How long to wait for workers to wind down after the run exits.
    #[serde_as(as = "DurationSeconds")]
    #[serde(default = "default_join_timeout")]
    pub join_timeout: Duration,
    pub phases: Vec<PhaseConfig>,
}

fn default_join_timeout() -> Duration {
    DEFAULT_JOIN_TIMEOUT
}

impl BenchConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            warmup: None,
            retry_limit: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            phases: Vec::new(),
        }
    }

    pub fn phase(mut self, phase: PhaseConfig) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn warmup(mut self, warmup: Duration) -> Self {
        self.warmup = Some(warmup);
        self
    }

    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Check every invariant the engine relies on and produce the immutable
    /// phase list. Out-of-range active-worker counts are clamped with a
    /// warning, mirroring how the loader has always treated them; everything
    /// else is fatal.
    pub fn build_phases(
        &self,
        registry: &TransactionRegistry,
    ) -> Result<Vec<Arc<Phase>>, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.phases.is_empty() {
            return Err(ConfigError::NoPhases);
        }

        let expected = registry.selectable_count();
        let mut phases = Vec::with_capacity(self.phases.len());
        for (id, cfg) in self.phases.iter().enumerate() {
            if cfg.weights.len() != expected {
                return Err(ConfigError::WeightCountMismatch {
                    phase: id,
                    expected,
                    actual: cfg.weights.len(),
                });
            }

            let rate = cfg.rate.resolve(id)?;
            if cfg.duration.is_none() && !cfg.serial && rate != Rate::Disabled {
                return Err(ConfigError::UntimedNotSerial { phase: id });
            }

            let mut active = cfg.active_workers.unwrap_or(self.workers);
            if active == 0 {
                return Err(ConfigError::NoActiveWorkers { phase: id });
            }
            if active > self.workers {
                warn!(
                    phase = id,
                    requested = active,
                    total = self.workers,
                    "more active workers than configured; clamping"
                );
                active = self.workers;
            }
            if cfg.serial && active != 1 {
                warn!(phase = id, "serial ordering is enabled; active workers clamped to 1");
                active = 1;
            }

            phases.push(Arc::new(Phase::new(
                id,
                cfg.duration,
                rate,
                cfg.arrival,
                cfg.weights.clone(),
                active,
                cfg.serial,
            )?));
        }

        Ok(phases)
    }
}
