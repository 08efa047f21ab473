//! Reconstruction configuration
//!
//! Every option has a default; a JSON document only needs to name the
//! options it overrides.

use serde::{Deserialize, Serialize};

use crate::error::ReconstructError;

/// Lowest plausible heart rate (beats/min)
pub const MIN_PLAUSIBLE_BPM: f64 = 25.0;

/// Highest plausible heart rate (beats/min)
pub const MAX_PLAUSIBLE_BPM: f64 = 220.0;

/// Milliseconds per minute, the numerator of every rate conversion
pub const MS_PER_MINUTE: f64 = 60_000.0;

/// Default overlap tolerated between consecutive bursts
pub const DEFAULT_DRIFT_TOLERANCE_MS: f64 = 1000.0;

/// How overlapping bursts are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    /// Keep the bursts as reported and record a warning
    #[default]
    Lenient,
    /// Abort the reconstruction
    Strict,
}

/// Artifact filter and smoother options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Intervals above this are removed (longest plausible beat)
    pub max_threshold_ms: f64,
    /// Intervals below this are removed (shortest plausible beat)
    pub min_threshold_ms: f64,
    /// Weights of the spike filter neighbourhood, centred on the value under
    /// test. The centre weight is ignored; the value never joins its own
    /// baseline.
    pub spike_window_weights: Vec<f64>,
    /// Allowed deviation from the local baseline, in local standard deviations
    pub spike_std_factor: f64,
    /// Length of the sliding median (odd)
    pub median_window: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_threshold_ms: MS_PER_MINUTE / MIN_PLAUSIBLE_BPM,
            min_threshold_ms: MS_PER_MINUTE / MAX_PLAUSIBLE_BPM,
            spike_window_weights: vec![1.0, 1.0, 0.0, 1.0, 1.0],
            spike_std_factor: 2.0,
            median_window: 5,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ReconstructError> {
        let invalid = |msg: String| Err(ReconstructError::InvalidConfig(msg));

        if !(self.min_threshold_ms > 0.0 && self.min_threshold_ms < self.max_threshold_ms) {
            return invalid(format!(
                "thresholds must satisfy 0 < min ({}) < max ({})",
                self.min_threshold_ms, self.max_threshold_ms
            ));
        }

        let len = self.spike_window_weights.len();
        if len < 3 || len % 2 == 0 {
            return invalid(format!(
                "spike_window_weights must have an odd length of at least 3, got {}",
                len
            ));
        }
        if self
            .spike_window_weights
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return invalid("spike_window_weights must be finite and non-negative".to_string());
        }
        let half = len / 2;
        let neighbour_weight: f64 = self
            .spike_window_weights
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != half)
            .map(|(_, w)| w)
            .sum();
        if neighbour_weight <= 0.0 {
            return invalid("spike_window_weights need at least one non-zero neighbour".to_string());
        }

        if !(self.spike_std_factor.is_finite() && self.spike_std_factor > 0.0) {
            return invalid(format!(
                "spike_std_factor must be positive, got {}",
                self.spike_std_factor
            ));
        }

        if self.median_window == 0 || self.median_window % 2 == 0 {
            return invalid(format!(
                "median_window must be odd, got {}",
                self.median_window
            ));
        }

        Ok(())
    }
}

/// Options for one reconstruction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Reconstruct beats and derive heart rate. Requires at least one burst.
    pub heart_rate: bool,
    pub drift: DriftPolicy,
    /// Overlap between consecutive bursts tolerated before it counts as drift
    pub drift_tolerance_ms: f64,
    pub filter: FilterConfig,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            heart_rate: true,
            drift: DriftPolicy::default(),
            drift_tolerance_ms: DEFAULT_DRIFT_TOLERANCE_MS,
            filter: FilterConfig::default(),
        }
    }
}

impl ReconstructionConfig {
    /// Load a configuration from JSON, defaulting missing options
    pub fn from_json(json: &str) -> Result<Self, ReconstructError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ReconstructError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ReconstructError> {
        if !(self.drift_tolerance_ms.is_finite() && self.drift_tolerance_ms >= 0.0) {
            return Err(ReconstructError::InvalidConfig(format!(
                "drift_tolerance_ms must be non-negative, got {}",
                self.drift_tolerance_ms
            )));
        }
        self.filter.validate()
    }
}
