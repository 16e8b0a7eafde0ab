use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Survival probability whose crossing time is reported by default.
pub const DEFAULT_CROSSING_THRESHOLD: f64 = 0.25;
/// Default time grid, in months.
pub const DEFAULT_GRID_START: f64 = 0.0;
pub const DEFAULT_GRID_END: f64 = 400.0;
pub const DEFAULT_GRID_SAMPLES: usize = 2000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Crossing threshold {0} must be a probability between 0 and 1.")]
    InvalidThreshold(f64),
    #[error("Invalid time grid: {0}")]
    InvalidGrid(String),
}

/// Evenly spaced evaluation times, both endpoints included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeGridSpec {
    pub start: f64,
    pub end: f64,
    pub samples: usize,
}

impl Default for TimeGridSpec {
    fn default() -> Self {
        Self {
            start: DEFAULT_GRID_START,
            end: DEFAULT_GRID_END,
            samples: DEFAULT_GRID_SAMPLES,
        }
    }
}

impl TimeGridSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(ConfigError::InvalidGrid(format!(
                "start {} must be a finite, non-negative number of months",
                self.start
            )));
        }
        if !self.end.is_finite() || self.end <= self.start {
            return Err(ConfigError::InvalidGrid(format!(
                "end {} must be finite and greater than start {}",
                self.end, self.start
            )));
        }
        if self.samples < 2 {
            return Err(ConfigError::InvalidGrid(format!(
                "at least 2 samples are required, got {}",
                self.samples
            )));
        }
        Ok(())
    }

    pub fn times(&self) -> Array1<f64> {
        Array1::linspace(self.start, self.end, self.samples)
    }
}

/// Whether the survival curve is still produced when the median is not finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurvePolicy {
    /// The curve is computed for charting whatever the median turns out to be.
    #[default]
    Independent,
    /// An invalid median withholds the curve as well.
    GatedOnMedian,
}

/// Caller-tunable settings of the estimation pipeline.
///
/// Every field has a default, so a TOML file only needs the values it overrides:
///
/// ```toml
/// crossing_threshold = 0.2
///
/// [grid]
/// end = 240.0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    pub crossing_threshold: f64,
    pub grid: TimeGridSpec,
    pub curve_policy: CurvePolicy,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            crossing_threshold: DEFAULT_CROSSING_THRESHOLD,
            grid: TimeGridSpec::default(),
            curve_policy: CurvePolicy::default(),
        }
    }
}

impl EstimationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.crossing_threshold) {
            return Err(ConfigError::InvalidThreshold(self.crossing_threshold));
        }
        self.grid.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}
