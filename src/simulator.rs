//! Probabilistic wireless link model
//!
//! Pure(ish) function-style model over tunable parameters: maximum range,
//! base failure rate, interference level, and latency with Gaussian jitter.
//! All randomness flows through one injectable RNG so tests can pin seeds
//! and reproduce outcomes.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::config::SimulatorConfig;
use crate::domain_types::SignalStrength;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::Mutex;

/// Standard deviation of the signal-strength noise term.
const SIGNAL_NOISE_SIGMA: f64 = 0.05;

/// Floor applied to every simulated delivery delay, in milliseconds.
const MIN_DELAY_MS: u64 = 10;

/// Extra failure probability applied at zero signal, scaled down linearly as
/// the signal improves.
const SIGNAL_FAILURE_WEIGHT: f64 = 0.3;

/// Result of one simulated delivery attempt.
///
/// `signal_strength` is populated even for failed attempts so observers can
/// record the quality of the last try.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryOutcome {
    /// Whether the attempt succeeded.
    pub delivered: bool,
    /// Link quality sampled for the attempt.
    pub signal_strength: SignalStrength,
    /// Simulated one-way delay in milliseconds; zero for out-of-range
    /// attempts.
    pub delay_ms: u64,
}

/// Simulates imperfect wireless links between positioned agents.
pub struct NetworkSimulator {
    config: SimulatorConfig,
    rng: Mutex<StdRng>,
}

impl NetworkSimulator {
    /// Creates a simulator with an entropy-seeded RNG.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a simulator with a fixed seed for reproducible runs.
    #[must_use]
    pub fn with_seed(config: SimulatorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// The active parameter set.
    #[must_use]
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Whether two agents separated by `distance` are within `range`.
    #[must_use]
    pub fn can_communicate(&self, distance: f64, range: f64) -> bool {
        range > 0.0 && distance <= range
    }

    /// Samples the signal strength of a link of length `distance` under the
    /// given `range`.
    ///
    /// In range, the strength is the distance-derived base `1 - d/range`,
    /// degraded by interference and perturbed by Gaussian noise, clamped to
    /// `[0, 1]`. Out of range the strength is zero.
    #[must_use]
    pub fn signal_strength(&self, distance: f64, range: f64) -> SignalStrength {
        if !self.can_communicate(distance, range) {
            return SignalStrength::zero();
        }
        let base = 1.0 - distance / range;
        let degraded = base - self.config.interference_level * base;
        let noise = self.sample_normal(SIGNAL_NOISE_SIGMA);
        SignalStrength::clamped(degraded + noise)
    }

    /// Runs one delivery attempt over a link of length `distance`.
    ///
    /// The total failure probability is the configured base rate plus a
    /// signal-dependent term `0.3 * (1 - s)`.
    #[must_use]
    pub fn simulate_delivery(&self, distance: f64) -> DeliveryOutcome {
        let range = self.config.range;
        if !self.can_communicate(distance, range) {
            return DeliveryOutcome {
                delivered: false,
                signal_strength: SignalStrength::zero(),
                delay_ms: 0,
            };
        }

        let signal_strength = self.signal_strength(distance, range);
        let failure_probability =
            self.config.failure_rate + SIGNAL_FAILURE_WEIGHT * (1.0 - signal_strength.as_f64());
        let roll: f64 = self
            .rng
            .lock()
            .expect("simulator rng mutex poisoned")
            .gen_range(0.0..1.0);
        let delivered = roll >= failure_probability;

        DeliveryOutcome {
            delivered,
            signal_strength,
            delay_ms: self.delivery_delay_ms(distance),
        }
    }

    /// Samples the one-way delay for a link of length `distance`:
    /// `max(10, base + 50 * (d/R) + jitter)`, rounded to whole milliseconds.
    #[must_use]
    pub fn delivery_delay_ms(&self, distance: f64) -> u64 {
        let proportional = 50.0 * (distance / self.config.range);
        let jitter = self.sample_normal(self.config.latency_variation_ms);
        let raw = self.config.base_latency_ms + proportional + jitter;
        if raw.is_finite() && raw > 0.0 {
            (raw.round() as u64).max(MIN_DELAY_MS)
        } else {
            MIN_DELAY_MS
        }
    }

    fn sample_normal(&self, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return 0.0;
        }
        let normal = Normal::new(0.0, sigma).expect("invalid normal sigma");
        let mut rng = self.rng.lock().expect("simulator rng mutex poisoned");
        normal.sample(&mut *rng)
    }
}
