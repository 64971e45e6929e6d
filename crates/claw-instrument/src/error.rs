//! Error types for the claw-instrument crate.

use thiserror::Error;

/// Errors that can occur while declaring, updating, collecting or encoding metrics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    /// A metric or label name does not satisfy the exposition naming rules.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// The offending metric or label name.
        name: String,
        /// The reason the name is invalid.
        reason: String,
    },

    /// A counter was incremented by a negative (or NaN) delta.
    #[error("counter cannot be incremented by {delta}; use a gauge to decrement")]
    NegativeIncrement {
        /// The rejected delta.
        delta: f64,
    },

    /// Histogram bucket bounds are not strictly increasing.
    #[error("histogram levels are not strictly increasing: {reason}")]
    UnsortedLevels {
        /// The reason the levels were rejected.
        reason: String,
    },

    /// A generated bucket layout had invalid parameters.
    #[error("invalid bucket layout: {reason}")]
    InvalidBucketLayout {
        /// The reason the layout was rejected.
        reason: String,
    },

    /// A collector was registered twice, or unregistered without being registered.
    #[error("collector management error: {reason}")]
    CollectorManagement {
        /// The reason the operation failed.
        reason: String,
    },

    /// A collector could not gather data for this scrape.
    ///
    /// The registry recovers from this error; every other error aborts collection.
    #[error("collector '{collector}' cannot collect right now: {reason}")]
    CollectionTransient {
        /// Name of the collector that failed.
        collector: String,
        /// Why collection was not possible.
        reason: String,
    },

    /// A snapshot handed to the encoder is structurally malformed.
    #[error("cannot format metric family: {reason}")]
    OutputFormatter {
        /// What is wrong with the snapshot.
        reason: String,
    },
}

impl InstrumentError {
    pub(crate) fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn output_formatter(reason: impl Into<String>) -> Self {
        Self::OutputFormatter {
            reason: reason.into(),
        }
    }

    /// Builds the transient error a [`Collect`](crate::collector::Collect)
    /// implementation returns when it cannot produce a snapshot this cycle.
    #[must_use]
    pub fn collection_transient(collector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CollectionTransient {
            collector: collector.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors the registry recovers from during collection.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::CollectionTransient { .. })
    }
}

/// Result type for instrumentation operations.
pub type Result<T> = std::result::Result<T, InstrumentError>;
