//! Tuning parameters shared by the estimator, selector and planner.
//!
//! Parameters load from YAML; every section carries `#[serde(default)]` so a
//! partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// 120 km/h expressed in distance units per second.
pub const VIRTUAL_VEHICLE_SPEED: f64 = 120.0 / 3.6;

/// Errors raised while loading or validating a [`PilotConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Lateral band (absolute y difference) inside which a gap vehicle counts as
/// sitting in the destination lane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapBand {
    pub min: f64,
    pub max: f64,
}

impl GapBand {
    /// Inclusive on both ends.
    pub fn contains(&self, lateral: f64) -> bool {
        self.min <= lateral && lateral <= self.max
    }
}

impl Default for GapBand {
    fn default() -> Self {
        Self { min: 1.0, max: 4.3 }
    }
}

/// Configuration for one ego vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    /// Fixed simulation step in time units.
    pub time_step: f64,
    /// Lane width in distance units.
    pub lane_width: f64,
    /// Neighbor sensing radius, also the offset of virtual leader/follower.
    pub sensing_radius: f64,
    /// Speed assigned to synthesized virtual vehicles.
    pub virtual_speed: f64,
    /// Initial forward speed command while free driving.
    pub free_drive_speed: f64,
    pub gap_band: GapBand,
    /// Cutoff frequency of the optional velocity low-pass filter. `None`
    /// keeps the raw finite difference.
    pub velocity_filter_hz: Option<f64>,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            time_step: 0.01,
            lane_width: 3.2,
            sensing_radius: 200.0,
            virtual_speed: VIRTUAL_VEHICLE_SPEED,
            free_drive_speed: 8.0,
            gap_band: GapBand::default(),
            velocity_filter_hz: None,
        }
    }
}

impl PilotConfig {
    /// Loads and validates a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parses and validates a YAML document.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanepilot::common::params::PilotConfig;
    ///
    /// let config = PilotConfig::from_yaml("lane_width: 3.5\n").unwrap();
    /// assert_eq!(config.lane_width, 3.5);
    /// assert_eq!(config.time_step, 0.01);
    /// ```
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: PilotConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("time_step", self.time_step),
            ("lane_width", self.lane_width),
            ("sensing_radius", self.sensing_radius),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.gap_band.min > self.gap_band.max {
            return Err(ConfigError::Invalid(format!(
                "gap_band min {} exceeds max {}",
                self.gap_band.min, self.gap_band.max
            )));
        }
        if let Some(fc) = self.velocity_filter_hz {
            if !(fc > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "velocity_filter_hz must be positive, got {fc}"
                )));
            }
        }
        Ok(())
    }
}
