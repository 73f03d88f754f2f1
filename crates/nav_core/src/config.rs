//! Centralized tracking configuration
//!
//! Every threshold used by the tracking pipeline lives here, one source of
//! truth per value. A [`TrackingConfig`] is built once and handed to the
//! components at construction; nothing mutates it afterwards.
//!
//! ## Threshold Categories
//!
//! | Category | Consumer |
//! |----------|----------|
//! | Segment | `SegmentTracker` advance rule |
//! | Deviation | `DeviationDetector` angle + debounce |
//! | Sampler | `SpeedSampler` outlier filter |
//! | Movement | displacement gate before direction comparison |
//! | Simulation | `SimulatedMover` speed, arrival, splice scoring |
//! | Detour | `DeviationGenerator` test perturbations |
//!
//! ## Usage
//!
//! ```rust
//! use nav_core::config::TrackingConfig;
//!
//! let config = TrackingConfig::default();
//! let urban = TrackingConfig::urban();
//! let from_env = TrackingConfig::from_env_or_default();
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Environment Variables
//!
//! - `NAV_TRACKING_PROFILE`: Select preset (urban, highway, default)

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{NavError, Result};

/// Environment variable selecting a preset.
pub const PROFILE_ENV_VAR: &str = "NAV_TRACKING_PROFILE";

/// Complete tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrackingConfig {
    pub segment: SegmentThresholds,
    pub deviation: DeviationThresholds,
    pub sampler: SamplerThresholds,
    pub movement: MovementThresholds,
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub detour: DetourSettings,
}

impl TrackingConfig {
    /// City driving: slow vehicle, short blocks, quicker reaction
    pub fn urban() -> Self {
        Self {
            deviation: DeviationThresholds {
                angle_threshold_deg: 35.0, // Blocks are short, headings wobble more
                iteration_threshold: 8,
            },
            sampler: SamplerThresholds {
                max_reasonable_speed: 30.0,
                ..SamplerThresholds::default()
            },
            movement: MovementThresholds {
                min_movement: 0.5,
                max_movement_per_tick: 3.0,
                ..MovementThresholds::default()
            },
            simulation: SimulationSettings {
                speed: 12.0,
                ..SimulationSettings::default()
            },
            ..Self::default()
        }
    }

    /// Highway driving: fast vehicle, long straight segments
    pub fn highway() -> Self {
        Self {
            segment: SegmentThresholds {
                progress_threshold: 0.9,
            },
            deviation: DeviationThresholds {
                angle_threshold_deg: 25.0,
                iteration_threshold: 12,
            },
            sampler: SamplerThresholds {
                max_reasonable_speed: 90.0,
                ..SamplerThresholds::default()
            },
            movement: MovementThresholds {
                min_movement: 2.0,
                max_movement_per_tick: 10.0,
                ..MovementThresholds::default()
            },
            simulation: SimulationSettings {
                speed: 33.0,
                arrival_tolerance: 2.0,
                ..SimulationSettings::default()
            },
            ..Self::default()
        }
    }

    /// Load from environment variable NAV_TRACKING_PROFILE or use default
    pub fn from_env_or_default() -> Self {
        Self::from_profile_name(&env::var(PROFILE_ENV_VAR).unwrap_or_default())
    }

    /// Preset by name; unknown names fall back to the default preset.
    pub fn from_profile_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "urban" => Self::urban(),
            "highway" => Self::highway(),
            _ => Self::default(),
        }
    }

    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| NavError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave silently.
    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, what: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(NavError::InvalidConfig(what.to_string()))
            }
        }

        let s = &self.segment;
        check(
            s.progress_threshold.is_finite() && s.progress_threshold > 0.0,
            "segment.progress_threshold must be positive",
        )?;

        let d = &self.deviation;
        check(
            d.angle_threshold_deg.is_finite() && (0.0..180.0).contains(&d.angle_threshold_deg),
            "deviation.angle_threshold_deg must be in [0, 180)",
        )?;
        check(d.iteration_threshold > 0, "deviation.iteration_threshold must be > 0")?;

        let sp = &self.sampler;
        check(sp.speed_capacity > 0, "sampler.speed_capacity must be > 0")?;
        check(
            sp.min_interval_s.is_finite() && sp.min_interval_s >= 0.0,
            "sampler.min_interval_s must be >= 0",
        )?;
        check(
            sp.max_reasonable_speed.is_finite() && sp.max_reasonable_speed > 0.0,
            "sampler.max_reasonable_speed must be positive",
        )?;

        let m = &self.movement;
        check(m.displacement_lag_ticks > 0, "movement.displacement_lag_ticks must be > 0")?;
        check(
            m.min_movement.is_finite() && m.min_movement >= 0.0,
            "movement.min_movement must be >= 0",
        )?;
        check(
            m.max_movement_per_tick.is_finite() && m.max_movement_per_tick > m.min_movement,
            "movement.max_movement_per_tick must exceed movement.min_movement",
        )?;

        let sim = &self.simulation;
        check(
            sim.speed.is_finite() && sim.speed > 0.0,
            "simulation.speed must be positive",
        )?;
        check(
            sim.arrival_tolerance.is_finite() && sim.arrival_tolerance >= 0.0,
            "simulation.arrival_tolerance must be >= 0",
        )?;

        let det = &self.detour;
        check(
            det.length.is_finite() && det.length > 0.0,
            "detour.length must be positive",
        )?;
        check(det.steps > 0, "detour.steps must be > 0")?;
        Ok(())
    }
}

/// Segment tracker thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentThresholds {
    /// Progress along the current segment at which advancing is considered
    pub progress_threshold: f64,
}

impl Default for SegmentThresholds {
    fn default() -> Self {
        Self {
            progress_threshold: 0.8,
        }
    }
}

/// Course-deviation detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationThresholds {
    /// Divergence (degrees) above which a sample counts as a violation
    pub angle_threshold_deg: f64,
    /// Consecutive violations needed to fire
    pub iteration_threshold: u32,
}

impl Default for DeviationThresholds {
    fn default() -> Self {
        Self {
            angle_threshold_deg: 30.0,
            iteration_threshold: 10,
        }
    }
}

/// Speed sampler thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerThresholds {
    /// Rolling window size (samples)
    pub speed_capacity: usize,
    /// Updates closer together than this (seconds) do not mutate state
    pub min_interval_s: f64,
    /// Instantaneous speeds above this (units/s) are outliers
    pub max_reasonable_speed: f64,
    /// Accepted samples required before direction checks run
    pub min_samples: usize,
}

impl Default for SamplerThresholds {
    fn default() -> Self {
        Self {
            speed_capacity: 100,
            min_interval_s: 0.01,
            max_reasonable_speed: 60.0,
            min_samples: 3,
        }
    }
}

/// Displacement gate applied before direction comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementThresholds {
    /// Ticks between the two player positions compared (C -> D)
    pub displacement_lag_ticks: usize,
    /// Minimum |D - C| for the displacement to carry a direction
    pub min_movement: f64,
    /// Maximum plausible movement per elapsed tick; larger is a warp
    pub max_movement_per_tick: f64,
}

impl Default for MovementThresholds {
    fn default() -> Self {
        Self {
            displacement_lag_ticks: 10,
            min_movement: 1.0,
            max_movement_per_tick: 5.0,
        }
    }
}

/// Simulated mover settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Constant linear speed (units/s)
    pub speed: f64,
    /// Distance at which the original destination counts as reached
    pub arrival_tolerance: f64,
    /// Weight of the "ahead of movement" term when choosing a splice index
    pub splice_alignment_weight: f64,
    /// Weight of the relative-distance term when choosing a splice index
    pub splice_distance_weight: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            speed: 20.0,
            arrival_tolerance: 1.0,
            splice_alignment_weight: 1.0,
            splice_distance_weight: 1.0,
        }
    }
}

/// Random wrong-turn generator used to exercise recalculation in simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetourSettings {
    pub enabled: bool,
    pub seed: u64,
    /// Route points the mover must reach before a detour is taken
    pub trigger_after_points: usize,
    /// Distance driven off-route
    pub length: f64,
    /// Points in the generated detour polyline
    pub steps: usize,
}

impl Default for DetourSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            seed: 42,
            trigger_after_points: 2,
            length: 150.0,
            steps: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = TrackingConfig::default();
        assert!((config.segment.progress_threshold - 0.8).abs() < 1e-9);
        assert!((config.deviation.angle_threshold_deg - 30.0).abs() < 1e-9);
        assert_eq!(config.deviation.iteration_threshold, 10);
        assert_eq!(config.sampler.speed_capacity, 100);
        assert_eq!(config.movement.displacement_lag_ticks, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_urban_preset() {
        let config = TrackingConfig::urban();
        // Slower vehicle, tighter speed ceiling
        assert!(config.simulation.speed < SimulationSettings::default().speed);
        assert!(config.sampler.max_reasonable_speed < SamplerThresholds::default().max_reasonable_speed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_highway_preset() {
        let config = TrackingConfig::highway();
        assert!(config.simulation.speed > SimulationSettings::default().speed);
        assert!(config.deviation.iteration_threshold > 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profile_name_fallback() {
        assert_eq!(TrackingConfig::from_profile_name(" Urban "), TrackingConfig::urban());
        assert_eq!(TrackingConfig::from_profile_name("nonsense"), TrackingConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrackingConfig::default();
        config.deviation.iteration_threshold = 0;
        assert!(matches!(config.validate(), Err(NavError::InvalidConfig(_))));

        let mut config = TrackingConfig::default();
        config.movement.max_movement_per_tick = config.movement.min_movement;
        assert!(config.validate().is_err());

        let mut config = TrackingConfig::default();
        config.simulation.speed = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization() {
        let config = TrackingConfig::highway();
        let json = serde_json::to_string(&config).expect("Should serialize");
        let parsed = TrackingConfig::from_json(&json).expect("Should deserialize");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_json_missing_detour_uses_default() {
        let mut value = serde_json::to_value(TrackingConfig::default()).unwrap();
        value.as_object_mut().unwrap().remove("detour");
        let parsed = TrackingConfig::from_json(&value.to_string()).unwrap();
        assert_eq!(parsed.detour, DetourSettings::default());
    }
}
