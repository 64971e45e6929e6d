//! Serializable configuration.
//!
//! [`ExpositionConfig`] controls how a registry is rendered for scrapes;
//! [`BucketLayout`] describes histogram bounds so they can live in a config
//! file next to the rest of a service's settings.
//!
//! ```rust
//! use claw_instrument::config::BucketLayout;
//!
//! let layout: BucketLayout = serde_json::from_str(r#"{"kind":"powers_of","base":2.0,"count":3}"#).unwrap();
//! assert_eq!(layout.levels().unwrap(), vec![0.0, 1.0, 2.0, 4.0, f64::INFINITY]);
//! ```

use serde::{Deserialize, Serialize};

use crate::encoding::Format;
use crate::error::{InstrumentError, Result};
use crate::value::{DEFAULT_HISTOGRAM_LEVELS, HistogramValue, levels_linear, levels_powers_of};

/// Settings for rendering a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpositionConfig {
    /// Output format when no `Accept` header decides it.
    pub format: Format,
    /// Leave out families that have no series instead of failing the scrape.
    pub skip_empty_families: bool,
}

impl Default for ExpositionConfig {
    fn default() -> Self {
        Self {
            format: Format::Text,
            skip_empty_families: true,
        }
    }
}

impl ExpositionConfig {
    /// Returns the default settings with `format` selected.
    #[must_use]
    pub fn with_format(format: Format) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }
}

/// How histogram bucket bounds are generated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketLayout {
    /// [`DEFAULT_HISTOGRAM_LEVELS`].
    #[default]
    Default,
    /// Bounds listed verbatim.
    Explicit {
        /// Strictly increasing upper bounds.
        bounds: Vec<f64>,
    },
    /// `0, base^0, ..., base^(count-1), +Inf`.
    PowersOf {
        /// Growth factor, greater than one.
        base: f64,
        /// Number of powers.
        count: usize,
    },
    /// `start, start + width, ...`, `count` bounds.
    Linear {
        /// First bound.
        start: f64,
        /// Distance between bounds.
        width: f64,
        /// Number of bounds.
        count: usize,
    },
}

impl BucketLayout {
    /// Computes the bucket bounds.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::InvalidBucketLayout` for bad generator
    /// parameters and `InstrumentError::UnsortedLevels` for explicit bounds
    /// that are not strictly increasing.
    pub fn levels(&self) -> Result<Vec<f64>> {
        match self {
            Self::Default => Ok(DEFAULT_HISTOGRAM_LEVELS.to_vec()),
            Self::Explicit { bounds } => {
                if bounds.is_empty() {
                    return Err(InstrumentError::InvalidBucketLayout {
                        reason: "explicit layout needs at least one bound".to_string(),
                    });
                }
                if bounds.iter().any(|b| b.is_nan()) || bounds.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(InstrumentError::UnsortedLevels {
                        reason: format!("bounds {bounds:?} are not strictly increasing"),
                    });
                }
                Ok(bounds.clone())
            }
            Self::PowersOf { base, count } => levels_powers_of(*base, *count),
            Self::Linear { start, width, count } => levels_linear(*start, *width, *count),
        }
    }

    /// Builds an empty histogram value with this layout.
    ///
    /// # Errors
    ///
    /// Same as [`levels`](Self::levels).
    pub fn histogram(&self) -> Result<HistogramValue> {
        HistogramValue::new(&self.levels()?)
    }
}
