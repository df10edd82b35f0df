// navfuse_node/src/config.rs

use crate::error::NodeError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use navfuse_core::config::{FusionConfig, MatcherConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// # NodeConfig
/// Everything a node run needs. This struct is the root of the data parsed
/// from a scenario TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub fusion: FusionConfig,
    pub matcher: MatcherConfig,
    pub map_service: MapServiceConfig,
    pub scenario: ScenarioConfig,
}

impl NodeConfig {
    /// Loads the defaults, then the TOML file (if any), then every
    /// `NAVFUSE_`-prefixed environment variable. Nested keys are separated
    /// by a double underscore, e.g. `NAVFUSE_FUSION__INTEGRITY_THRESHOLD=4`.
    pub fn load(path: Option<&Path>) -> Result<Self, NodeError> {
        let mut figment = Figment::from(Serialized::defaults(NodeConfig::default()));
        if let Some(path) = path {
            info!("Loading scenario from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        let config: NodeConfig = figment
            .merge(Env::prefixed("NAVFUSE_").split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        self.fusion.validate()?;
        self.matcher.validate()?;
        self.scenario.validate()
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapServiceConfig {
    /// Simulated provider latency per request.
    pub latency_ms: u64,
}

impl Default for MapServiceConfig {
    fn default() -> Self {
        Self { latency_ms: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    /// Simulated drive length in seconds.
    pub duration_s: f64,
    /// Simulated seconds per wall-clock second; 0 replays as fast as possible.
    pub time_scale: f64,
    /// Cruise speed along the route, m/s.
    pub speed_mps: f64,
    /// The vehicle stands still at the first waypoint this long.
    pub start_delay_s: f64,
    pub roads: Vec<RoadConfig>,
    /// Waypoints driven in order. Empty means "follow the first road".
    pub route: Vec<[f64; 2]>,
    pub gps: GpsSensorConfig,
    pub abs: AbsSensorConfig,
    pub gyro: GyroSensorConfig,
    /// GPS reports a poor quality index during this window.
    pub low_integrity: Option<TimeWindow>,
    /// No GPS at all during this window.
    pub gps_outage: Option<TimeWindow>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: Some(42),
            duration_s: 40.0,
            time_scale: 10.0,
            speed_mps: 10.0,
            start_delay_s: 1.0,
            roads: vec![
                RoadConfig {
                    id: 0,
                    vertices: vec![[0.0, 0.0], [200.0, 0.0], [200.0, 150.0]],
                },
                RoadConfig {
                    id: 1,
                    vertices: vec![[100.0, -100.0], [100.0, 100.0]],
                },
            ],
            route: Vec::new(),
            gps: GpsSensorConfig::default(),
            abs: AbsSensorConfig::default(),
            gyro: GyroSensorConfig::default(),
            low_integrity: None,
            gps_outage: None,
        }
    }
}

impl ScenarioConfig {
    /// The waypoints actually driven.
    pub fn waypoints(&self) -> Vec<[f64; 2]> {
        if !self.route.is_empty() {
            return self.route.clone();
        }
        self.roads
            .first()
            .map(|road| road.vertices.clone())
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        let invalid = |reason: &str| Err(NodeError::Scenario(reason.to_string()));
        if !(self.duration_s.is_finite() && self.duration_s > 0.0) {
            return invalid("duration_s must be positive");
        }
        if !(self.time_scale.is_finite() && self.time_scale >= 0.0) {
            return invalid("time_scale must not be negative");
        }
        if self.waypoints().len() < 2 {
            return invalid("the route needs at least two waypoints");
        }
        for rate in [self.gps.rate_hz, self.abs.rate_hz, self.gyro.rate_hz] {
            if !(rate.is_finite() && rate > 0.0) {
                return invalid("sensor rates must be positive");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoadConfig {
    pub id: u32,
    pub vertices: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindow {
    pub start_s: f64,
    pub end_s: f64,
}

impl TimeWindow {
    pub fn contains(&self, t: f64) -> bool {
        (self.start_s..self.end_s).contains(&t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpsSensorConfig {
    pub rate_hz: f64,
    pub position_std_m: f64,
    pub heading_std_rad: f64,
    /// Quality index reported outside the low-integrity window.
    pub integrity: i32,
    /// Quality index reported inside it.
    pub degraded_integrity: i32,
    /// Below this speed the receiver reports no course.
    pub min_course_speed_mps: f64,
}

impl Default for GpsSensorConfig {
    fn default() -> Self {
        Self {
            rate_hz: 1.0,
            position_std_m: 2.0,
            heading_std_rad: 0.05,
            integrity: 5,
            degraded_integrity: 1,
            min_course_speed_mps: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AbsSensorConfig {
    pub rate_hz: f64,
    /// Noise on each wheel's angular rate, rad/s.
    pub wheel_rate_std: f64,
}

impl Default for AbsSensorConfig {
    fn default() -> Self {
        Self {
            rate_hz: 50.0,
            wheel_rate_std: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GyroSensorConfig {
    pub rate_hz: f64,
    pub yaw_rate_std: f64,
    /// Constant yaw-rate bias, rad/s.
    pub bias: f64,
}

impl Default for GyroSensorConfig {
    fn default() -> Self {
        Self {
            rate_hz: 100.0,
            yaw_rate_std: 0.01,
            bias: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        NodeConfig::default().validate().unwrap();
        assert_eq!(NodeConfig::default().scenario.waypoints().len(), 3);
    }

    #[test]
    fn toml_overrides_merge_over_defaults() {
        let config: NodeConfig = Figment::from(Serialized::defaults(NodeConfig::default()))
            .merge(Toml::string(
                r#"
                [fusion]
                integrity_threshold = 4
                renormalization = "per_update"

                [scenario]
                duration_s = 12.0
                gps_outage = { start_s = 3.0, end_s = 5.0 }
                "#,
            ))
            .extract()
            .unwrap();
        assert_eq!(config.fusion.integrity_threshold, 4);
        assert_eq!(config.scenario.duration_s, 12.0);
        assert_eq!(config.scenario.gps.rate_hz, 1.0);
        assert!(config.scenario.gps_outage.unwrap().contains(4.0));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<NodeConfig, _> = Figment::from(Serialized::defaults(NodeConfig::default()))
            .merge(Toml::string("[fusion]\nintegrity = 4\n"))
            .extract();
        assert!(result.is_err());
    }

    #[test]
    fn config_survives_a_toml_round_trip() {
        let config = NodeConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
