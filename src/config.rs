//! Configuration for the communication core
//!
//! Provides tuned simulator presets for different link-quality regimes plus a
//! crate-level configuration with builder and validation support.

use crate::domain_types::{HistoryCapacity, MaxHops, MaxRetries, RetryBackoffMs};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field carried a value outside its documented range.
    #[error("invalid configuration: {field} - {reason}")]
    ValidationError {
        /// Name of the offending field.
        field: String,
        /// Human-readable constraint description.
        reason: String,
    },
}

/// Tunable parameters of the probabilistic link model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Maximum communication range R, in world units.
    pub range: f64,
    /// Base failure rate f in `[0, 1]` applied to every delivery attempt.
    pub failure_rate: f64,
    /// Interference level in `[0, 1]`; scales down the distance-derived
    /// signal.
    pub interference_level: f64,
    /// Base one-way latency L, in milliseconds.
    pub base_latency_ms: f64,
    /// Standard deviation of the latency jitter, in milliseconds.
    pub latency_variation_ms: f64,
}

impl SimulatorConfig {
    /// Near-ideal links: long range, almost no loss, low jitter.
    #[must_use]
    pub fn high_quality() -> Self {
        Self {
            range: 120.0,
            failure_rate: 0.01,
            interference_level: 0.05,
            base_latency_ms: 100.0,
            latency_variation_ms: 25.0,
        }
    }

    /// Field conditions a deployed swarm typically sees.
    #[must_use]
    pub fn realistic() -> Self {
        Self {
            range: 100.0,
            failure_rate: 0.05,
            interference_level: 0.10,
            base_latency_ms: 150.0,
            latency_variation_ms: 50.0,
        }
    }

    /// Degraded links: short range, heavy loss and interference.
    #[must_use]
    pub fn poor() -> Self {
        Self {
            range: 80.0,
            failure_rate: 0.15,
            interference_level: 0.30,
            base_latency_ms: 300.0,
            latency_variation_ms: 100.0,
        }
    }

    /// Validates the parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for the first field found out
    /// of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.range.is_finite() || self.range <= 0.0 {
            return Err(ConfigError::ValidationError {
                field: "range".to_string(),
                reason: "must be a positive finite distance".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ConfigError::ValidationError {
                field: "failure_rate".to_string(),
                reason: "must lie in [0, 1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.interference_level) {
            return Err(ConfigError::ValidationError {
                field: "interference_level".to_string(),
                reason: "must lie in [0, 1]".to_string(),
            });
        }
        if !self.base_latency_ms.is_finite() || self.base_latency_ms < 0.0 {
            return Err(ConfigError::ValidationError {
                field: "base_latency_ms".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        if !self.latency_variation_ms.is_finite() || self.latency_variation_ms < 0.0 {
            return Err(ConfigError::ValidationError {
                field: "latency_variation_ms".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::realistic()
    }
}

/// Complete configuration of a [`crate::engine::CommsEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommsConfig {
    /// Link-model parameters. The simulator's `range` also serves as the
    /// global default communication range for agents without an override.
    pub simulator: SimulatorConfig,
    /// Capacity of the delivered-message history.
    pub history_capacity: HistoryCapacity,
    /// BFS cutoff used by route discovery and the default hop budget of
    /// submitted messages.
    pub max_route_hops: MaxHops,
    /// Default retry bound used by `send_critical`.
    pub max_retries: MaxRetries,
    /// Base delay of the retry backoff schedule.
    pub retry_backoff_base: RetryBackoffMs,
}

impl CommsConfig {
    /// Creates a configuration builder for custom settings
    #[must_use]
    pub fn builder() -> CommsConfigBuilder {
        CommsConfigBuilder::new()
    }

    /// Validates the configuration for consistency and reasonable values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any configuration values are out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulator.validate()
    }
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            history_capacity: HistoryCapacity::default(),
            max_route_hops: MaxHops::default(),
            max_retries: MaxRetries::default(),
            retry_backoff_base: RetryBackoffMs::default(),
        }
    }
}

/// Builder for [`CommsConfig`].
#[derive(Debug, Default)]
pub struct CommsConfigBuilder {
    config: CommsConfig,
}

impl CommsConfigBuilder {
    /// Starts from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the simulator parameters.
    #[must_use]
    pub fn simulator(mut self, simulator: SimulatorConfig) -> Self {
        self.config.simulator = simulator;
        self
    }

    /// Replaces the history capacity.
    #[must_use]
    pub fn history_capacity(mut self, capacity: HistoryCapacity) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    /// Replaces the route-discovery hop cutoff.
    #[must_use]
    pub fn max_route_hops(mut self, hops: MaxHops) -> Self {
        self.config.max_route_hops = hops;
        self
    }

    /// Replaces the default retry bound.
    #[must_use]
    pub fn max_retries(mut self, retries: MaxRetries) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Replaces the retry backoff base delay.
    #[must_use]
    pub fn retry_backoff_base(mut self, base: RetryBackoffMs) -> Self {
        self.config.retry_backoff_base = base;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the assembled configuration is invalid.
    pub fn build(self) -> Result<CommsConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
