//! Metric identity and name validation.
//!
//! This module provides:
//! - [`MetricDescriptor`]: the immutable name, help text and label names of a metric
//! - [`validate_metric_name`] / [`validate_label_name`]: the exposition naming rules
//! - [`make_metric_name`]: `namespace_subsystem_name` composition

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{InstrumentError, Result};

/// Regex for valid metric names. A leading underscore must be followed by a
/// non-underscore character.
static METRIC_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((_[a-zA-Z0-9:])|[a-zA-Z:])[a-zA-Z0-9_:]*$").unwrap_or_else(|_| unreachable!())
});

/// Regex for valid label names.
static LABEL_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").unwrap_or_else(|_| unreachable!()));

/// Label names the encoder synthesizes itself.
pub const RESERVED_LABEL_NAMES: &[&str] = &["le", "quantile"];

/// Checks a metric name against the exposition naming rules.
///
/// # Errors
///
/// Returns `InstrumentError::InvalidName` if the name is invalid.
pub fn validate_metric_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(InstrumentError::invalid_name(name, "metric name cannot be empty"));
    }
    if !METRIC_NAME_REGEX.is_match(name) {
        return Err(InstrumentError::invalid_name(
            name,
            "metric name must match ^((_[a-zA-Z0-9:])|[a-zA-Z:])[a-zA-Z0-9_:]*$",
        ));
    }
    Ok(())
}

/// Checks a label name against the exposition naming rules.
///
/// # Errors
///
/// Returns `InstrumentError::InvalidName` if the name is invalid or reserved.
pub fn validate_label_name(name: &str) -> Result<()> {
    if RESERVED_LABEL_NAMES.contains(&name) {
        return Err(InstrumentError::invalid_name(
            name,
            "label name is reserved by the exposition format",
        ));
    }
    if !LABEL_NAME_REGEX.is_match(name) {
        return Err(InstrumentError::invalid_name(
            name,
            "label name must match ^[a-zA-Z_:][a-zA-Z0-9_:]*$",
        ));
    }
    Ok(())
}

/// Builds a metric name of the form `namespace_subsystem_name`.
///
/// Empty parts are skipped. The result is not validated.
#[must_use]
pub fn make_metric_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// The immutable identity of a declared metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl MetricDescriptor {
    /// Creates a validated descriptor.
    ///
    /// # Errors
    ///
    /// Returns `InstrumentError::InvalidName` if the metric name or any label
    /// name is invalid, reserved, or repeated.
    pub fn new(name: impl Into<String>, help: impl Into<String>, label_names: &[&str]) -> Result<Self> {
        let name = name.into();
        validate_metric_name(&name)?;

        let mut validated: Vec<String> = Vec::with_capacity(label_names.len());
        for label in label_names {
            validate_label_name(label)?;
            if validated.iter().any(|existing| existing == label) {
                return Err(InstrumentError::invalid_name(label, "label name declared twice"));
            }
            validated.push((*label).to_string());
        }

        Ok(Self {
            name,
            help: help.into(),
            label_names: validated,
        })
    }

    /// Returns the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the help text.
    #[must_use]
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Returns the label names in declaration order.
    #[must_use]
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

impl std::fmt::Display for MetricDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.label_names.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{{{}}}", self.name, self.label_names.join(","))
        }
    }
}
