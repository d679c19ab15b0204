use crate::config::ConfigError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

/// Target arrival rate for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rate {
    /// The phase never runs.
    Disabled,
    /// No rate gating; workers issue transactions back to back.
    Unlimited,
    /// Target arrivals per second.
    Limited(NonZeroU32),
}

/// Arrival process used while a phase is rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arrival {
    /// Evenly spaced arrivals.
    #[default]
    Regular,
    /// Exponentially distributed inter-arrival gaps.
    Poisson,
}

/// One segment of a run: bounded by a duration (or a single serial pass),
/// with its own target rate, arrival process, active worker count, and
/// weighted distribution over the selectable transaction types.
///
/// Immutable once built; the serial cursor lives in the worker.
#[derive(Debug, Clone)]
pub struct Phase {
    id: usize,
    duration: Option<Duration>,
    rate: Rate,
    arrival: Arrival,
    weights: Vec<f64>,
    active_workers: usize,
    serial: bool,
    selector: Option<WeightedIndex<f64>>,
}

impl Phase {
    pub(crate) fn new(
        id: usize,
        duration: Option<Duration>,
        rate: Rate,
        arrival: Arrival,
        weights: Vec<f64>,
        active_workers: usize,
        serial: bool,
    ) -> Result<Self, ConfigError> {
        let disabled = rate == Rate::Disabled;
        if !disabled {
            let valid = weights.iter().all(|w| w.is_finite() && *w >= 0.0)
                && weights.iter().any(|w| *w > 0.0);
            if !valid {
                return Err(ConfigError::BadWeights { phase: id });
            }
        }

        let selector = if serial || disabled {
            None
        } else {
            Some(
                WeightedIndex::new(weights.iter().copied())
                    .map_err(|_| ConfigError::BadWeights { phase: id })?,
            )
        };

        Ok(Self {
            id,
            duration,
            rate,
            arrival,
            weights,
            active_workers,
            serial,
            selector,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// `None` means the phase runs a single serial pass to completion
    /// instead of a timed window.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn arrival(&self) -> Arrival {
        self.arrival
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers
    }

    pub fn is_serial(&self) -> bool {
        self.serial
    }

    pub fn is_disabled(&self) -> bool {
        self.rate == Rate::Disabled
    }

    pub fn is_timed(&self) -> bool {
        self.duration.is_some()
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.rate, Rate::Limited(_))
    }

    /// Weighted random choice of a weight slot. `None` for disabled or
    /// serial phases.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        self.selector.as_ref().map(|s| s.sample(rng))
    }

    /// First slot at or after `cursor` with positive weight; serial passes
    /// never execute zero-weight slots.
    pub fn serial_slot(&self, cursor: usize) -> Option<usize> {
        self.weights
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, w)| **w > 0.0)
            .map(|(i, _)| i)
    }
}
