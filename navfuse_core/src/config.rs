// navfuse_core/src/config.rs

//! Immutable per-run configuration of the localization core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =========================================================================
// == Fusion Configuration ==
// =========================================================================

/// When the hypothesis weights are renormalized during a GPS cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenormalizationCadence {
    /// After every single measurement update.
    PerUpdate,
    /// Once, after all updates of the cycle.
    #[default]
    PerCycle,
}

/// # FusionConfig
/// Everything the positioning state machine and its models are tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FusionConfig {
    /// Minimum GPS quality index for a fix to be used.
    pub integrity_threshold: i32,
    /// Longest GPS silence tolerated while tracking, in seconds.
    pub gps_staleness_s: f64,
    /// Travelled distance after which the heading is considered observable.
    pub heading_init_distance_m: f64,
    pub wheel_radius_m: f64,

    // --- Process noise ---
    /// Std-dev of the ABS-derived speed, m/s.
    pub speed_noise_std: f64,
    /// Std-dev of the gyro yaw rate, rad/s.
    pub yaw_rate_noise_std: f64,
    /// Position random walk while standing still, m²/s.
    pub position_random_walk: f64,

    // --- GPS update ---
    /// Mahalanobis gate (in sigmas) above which a hypothesis is not corrected.
    pub gps_gate_sigma: f64,
    /// GPS heading is only fused when its std-dev is below this, rad.
    pub max_gps_heading_std: f64,
    /// GPS heading is only fused above this vehicle speed, m/s.
    pub min_course_speed_mps: f64,

    // --- Gaussian sum ---
    pub max_hypotheses: usize,
    /// Heading offset between neighbouring hypotheses when tracking starts, rad.
    pub heading_spread_rad: f64,
    /// Std-dev of the bootstrap heading prior, rad.
    pub initial_heading_std: f64,
    /// Hypotheses lighter than this are dropped after renormalization.
    pub prune_weight: f64,
    pub renormalization: RenormalizationCadence,

    // --- Map aiding ---
    /// Apply the matched road centre line as a pseudo-measurement.
    pub road_constraint: bool,
    pub road_half_width_m: f64,
    /// Radius of the map area requested around the vehicle.
    pub map_radius_m: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            integrity_threshold: 3,
            gps_staleness_s: 5.0,
            heading_init_distance_m: 1.0,
            wheel_radius_m: 0.3,
            speed_noise_std: 0.1,
            yaw_rate_noise_std: 0.02,
            position_random_walk: 0.05,
            gps_gate_sigma: 4.0,
            max_gps_heading_std: 0.35,
            min_course_speed_mps: 1.0,
            max_hypotheses: 5,
            heading_spread_rad: 0.35,
            initial_heading_std: 0.5,
            prune_weight: 1e-3,
            renormalization: RenormalizationCadence::PerCycle,
            road_constraint: true,
            road_half_width_m: 3.0,
            map_radius_m: 500.0,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("gps_staleness_s", self.gps_staleness_s)?;
        positive("heading_init_distance_m", self.heading_init_distance_m)?;
        positive("wheel_radius_m", self.wheel_radius_m)?;
        positive("speed_noise_std", self.speed_noise_std)?;
        positive("yaw_rate_noise_std", self.yaw_rate_noise_std)?;
        non_negative("position_random_walk", self.position_random_walk)?;
        positive("gps_gate_sigma", self.gps_gate_sigma)?;
        non_negative("max_gps_heading_std", self.max_gps_heading_std)?;
        non_negative("min_course_speed_mps", self.min_course_speed_mps)?;
        positive("heading_spread_rad", self.heading_spread_rad)?;
        positive("initial_heading_std", self.initial_heading_std)?;
        positive("road_half_width_m", self.road_half_width_m)?;
        positive("map_radius_m", self.map_radius_m)?;
        if self.max_hypotheses == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_hypotheses",
                reason: "at least one hypothesis is required",
            });
        }
        if !(0.0..1.0).contains(&self.prune_weight) {
            return Err(ConfigError::OutOfRange {
                field: "prune_weight",
                reason: "must lie in [0, 1)",
            });
        }
        Ok(())
    }
}

// =========================================================================
// == Map Matcher Configuration ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherConfig {
    /// Angular penalty of the match score, metres per radian of heading
    /// disagreement.
    pub heading_weight_m_per_rad: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            heading_weight_m_per_rad: 10.0,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("heading_weight_m_per_rad", self.heading_weight_m_per_rad)
    }
}

// --- Validation ---

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("configuration field `{field}` is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            reason: "must be finite and strictly positive",
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            reason: "must be finite and not negative",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FusionConfig::default().validate().unwrap();
        MatcherConfig::default().validate().unwrap();
        assert_eq!(FusionConfig::default().integrity_threshold, 3);
    }

    #[test]
    fn validation_names_the_offending_field() {
        let config = FusionConfig {
            max_hypotheses: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "max_hypotheses", .. })
        ));

        let config = FusionConfig {
            gps_staleness_s: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "gps_staleness_s", .. })
        ));
    }
}
