//! Chaos schedule and victim selection

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

/// Upper bound on a single wait between injection rounds
pub const MAX_CHAOS_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// When and how hard the injector strikes
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosSchedule {
    pub enabled: bool,
    /// Base period between injection rounds
    pub interval: Duration,
    /// Extra random wait, as a multiple of `interval`
    pub jitter_factor: f64,
    /// Fraction of eligible nodes failed per round
    pub failure_ratio: f64,
}

impl Default for ChaosSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(60),
            jitter_factor: 60.0,
            failure_ratio: 0.01,
        }
    }
}

impl ChaosSchedule {
    /// `interval` plus a random share of `jitter_factor * interval`,
    /// capped at [`MAX_CHAOS_WAIT`]
    pub fn next_wait<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.jitter_factor.is_nan() || self.jitter_factor <= 0.0 {
            return self.interval.min(MAX_CHAOS_WAIT);
        }
        let extra = self.interval.as_secs_f64() * self.jitter_factor * rng.gen::<f64>();
        let extra = Duration::try_from_secs_f64(extra).unwrap_or(MAX_CHAOS_WAIT);
        self.interval.saturating_add(extra).min(MAX_CHAOS_WAIT)
    }

    /// Longest wait `next_wait` can produce, in seconds
    pub fn max_wait_secs(&self) -> f64 {
        self.interval.as_secs_f64() * (1.0 + self.jitter_factor)
    }

    /// Number of victims out of `eligible` nodes, rounded up
    pub fn victim_count(&self, eligible: usize) -> usize {
        let count = (eligible as f64 * self.failure_ratio).ceil() as usize;
        count.min(eligible)
    }

    /// Pick this round's victims at random
    pub fn choose_victims<R: Rng + ?Sized>(&self, eligible: &[String], rng: &mut R) -> Vec<String> {
        eligible
            .choose_multiple(rng, self.victim_count(eligible.len()))
            .cloned()
            .collect()
    }
}
