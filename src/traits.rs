//! Trait seams and shared status types for the communication core
//!
//! The submission seam ([`MessageSink`]) decouples the retry policy and the
//! voting coordinator from the concrete engine, enabling synthetic sinks in
//! tests.

use crate::domain_types::OutgoingMessage;
use async_trait::async_trait;

/// Anything that accepts outgoing messages for eventual delivery.
///
/// Implementations report acceptance, not delivery: `true` means the message
/// entered the pending store. Delivery outcomes surface through the message
/// history and per-message status instead.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Submits a message, returning whether it was accepted.
    async fn submit(&self, message: OutgoingMessage) -> bool;
}

/// Component health status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Operating within all documented thresholds.
    Healthy,
    /// Operating, but some threshold is breached.
    Degraded {
        /// Which threshold is breached and how.
        reason: String,
    },
    /// Not operational.
    Unhealthy {
        /// Why the component is down.
        reason: String,
    },
}
