// navfuse_node/src/simulation/mod.rs

//! A deterministic synthetic drive standing in for the real sensor drivers.
//!
//! Every source draws its noise from its own `ChaCha8Rng`, seeded from the
//! scenario seed, so a source's samples do not depend on how the producer
//! threads happen to interleave.

mod producers;
mod route;

pub use producers::{spawn_producers, Pacer};
pub use route::{Route, Trajectory, TruthState};

use crate::config::ScenarioConfig;
use crate::error::NodeError;
use navfuse_core::messages::{AbsReading, GpsFix, GyroReading, SensorSample};
use navfuse_core::types::SensorSource;
use navfuse_core::utils::angles::{angle_diff, wrap_angle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Noise generator of one sensor source.
struct SourceNoise {
    rng: ChaCha8Rng,
}

impl SourceNoise {
    fn new(seed: u64, source: SensorSource) -> Self {
        let salt = match source {
            SensorSource::Gps => 0x9e37_79b9,
            SensorSource::Abs => 0x85eb_ca6b,
            SensorSource::Gyro => 0xc2b2_ae35,
        };
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed ^ salt),
        }
    }

    /// One draw from `N(0, std²)`. A zero std-dev yields exactly zero.
    fn sample(&mut self, std: f64) -> f64 {
        match Normal::new(0.0, std) {
            Ok(normal) if std > 0.0 => normal.sample(&mut self.rng),
            _ => 0.0,
        }
    }
}

/// The simulated vehicle and its sensors.
#[derive(Debug, Clone)]
pub struct SyntheticDrive {
    scenario: ScenarioConfig,
    trajectory: Trajectory,
    wheel_radius: f64,
    seed: u64,
}

impl SyntheticDrive {
    pub fn new(scenario: &ScenarioConfig, wheel_radius: f64) -> Result<Self, NodeError> {
        let route = Route::new(&scenario.waypoints())?;
        let seed = scenario.seed.unwrap_or_else(rand::random);
        Ok(Self {
            scenario: scenario.clone(),
            trajectory: Trajectory {
                route,
                speed: scenario.speed_mps,
                start_delay: scenario.start_delay_s,
            },
            wheel_radius,
            seed,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn duration(&self) -> f64 {
        self.scenario.duration_s
    }

    pub fn truth_at(&self, t: f64) -> TruthState {
        self.trajectory.state_at(t)
    }

    fn sample_times(&self, rate_hz: f64) -> impl Iterator<Item = f64> {
        let duration = self.scenario.duration_s;
        (0..)
            .map(move |k| k as f64 / rate_hz)
            .take_while(move |t| *t <= duration)
    }

    pub fn gps_samples(&self) -> Vec<SensorSample> {
        let cfg = &self.scenario.gps;
        let mut noise = SourceNoise::new(self.seed, SensorSource::Gps);
        let mut samples = Vec::new();
        for t in self.sample_times(cfg.rate_hz) {
            if self.scenario.gps_outage.is_some_and(|w| w.contains(t)) {
                continue;
            }
            let truth = self.truth_at(t);
            let x = truth.x + noise.sample(cfg.position_std_m);
            let y = truth.y + noise.sample(cfg.position_std_m);
            let course_noise = noise.sample(cfg.heading_std_rad);
            let has_course = truth.speed >= cfg.min_course_speed_mps;
            let integrity = if self.scenario.low_integrity.is_some_and(|w| w.contains(t)) {
                cfg.degraded_integrity
            } else {
                cfg.integrity
            };
            samples.push(SensorSample::Gps(GpsFix {
                x,
                y,
                heading: if has_course {
                    wrap_angle(truth.heading + course_noise)
                } else {
                    f64::NAN
                },
                sigma_x: cfg.position_std_m,
                sigma_y: cfg.position_std_m,
                sigma_xy: 0.0,
                sigma_heading: if has_course { cfg.heading_std_rad } else { f64::NAN },
                integrity,
                timestamp: t,
            }));
        }
        samples
    }

    pub fn abs_samples(&self) -> Vec<SensorSample> {
        let cfg = &self.scenario.abs;
        let mut noise = SourceNoise::new(self.seed, SensorSource::Abs);
        self.sample_times(cfg.rate_hz)
            .map(|t| {
                let rate = self.truth_at(t).speed / self.wheel_radius;
                SensorSample::Abs(AbsReading {
                    left: rate + noise.sample(cfg.wheel_rate_std),
                    right: rate + noise.sample(cfg.wheel_rate_std),
                    timestamp: t,
                })
            })
            .collect()
    }

    /// Yaw rate is the heading change over the preceding gyro period, so a
    /// sharp corner shows up as one short, strong pulse.
    pub fn gyro_samples(&self) -> Vec<SensorSample> {
        let cfg = &self.scenario.gyro;
        let period = 1.0 / cfg.rate_hz;
        let mut noise = SourceNoise::new(self.seed, SensorSource::Gyro);
        self.sample_times(cfg.rate_hz)
            .map(|t| {
                let now = self.truth_at(t).heading;
                let before = self.truth_at((t - period).max(0.0)).heading;
                let yaw_rate = angle_diff(now, before) / period;
                SensorSample::Gyro(GyroReading {
                    yaw_rate: yaw_rate + cfg.bias + noise.sample(cfg.yaw_rate_std),
                    timestamp: t,
                })
            })
            .collect()
    }

    pub fn samples(&self, source: SensorSource) -> Vec<SensorSample> {
        match source {
            SensorSource::Gps => self.gps_samples(),
            SensorSource::Abs => self.abs_samples(),
            SensorSource::Gyro => self.gyro_samples(),
        }
    }

    /// Every sample of every source in timestamp order. Samples sharing a
    /// timestamp keep the source order GPS, ABS, gyro.
    pub fn merged(&self) -> Vec<SensorSample> {
        let mut all: Vec<SensorSample> = SensorSource::ALL
            .iter()
            .flat_map(|source| self.samples(*source))
            .collect();
        all.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeWindow;

    fn scenario() -> ScenarioConfig {
        ScenarioConfig {
            duration_s: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn same_seed_same_samples() {
        let a = SyntheticDrive::new(&scenario(), 0.3).unwrap();
        let b = SyntheticDrive::new(&scenario(), 0.3).unwrap();
        assert_eq!(a.abs_samples(), b.abs_samples());
        assert_eq!(a.gyro_samples(), b.gyro_samples());

        let other = ScenarioConfig {
            seed: Some(7),
            ..scenario()
        };
        let c = SyntheticDrive::new(&other, 0.3).unwrap();
        assert_ne!(a.abs_samples(), c.abs_samples());
    }

    #[test]
    fn rates_and_ordering() {
        let drive = SyntheticDrive::new(&scenario(), 0.3).unwrap();
        assert_eq!(drive.gps_samples().len(), 11);
        assert_eq!(drive.abs_samples().len(), 501);
        let merged = drive.merged();
        assert_eq!(merged.len(), 11 + 501 + 1001);
        assert!(merged.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
        assert!(matches!(merged[0], SensorSample::Gps(_)));
    }

    #[test]
    fn outage_and_degraded_windows() {
        let config = ScenarioConfig {
            gps_outage: Some(TimeWindow {
                start_s: 2.0,
                end_s: 4.0,
            }),
            low_integrity: Some(TimeWindow {
                start_s: 6.0,
                end_s: 7.5,
            }),
            ..scenario()
        };
        let drive = SyntheticDrive::new(&config, 0.3).unwrap();
        let fixes: Vec<GpsFix> = drive
            .gps_samples()
            .into_iter()
            .filter_map(|s| match s {
                SensorSample::Gps(fix) => Some(fix),
                _ => None,
            })
            .collect();
        assert_eq!(fixes.len(), 9);
        assert!(fixes.iter().all(|f| f.timestamp < 2.0 || f.timestamp >= 4.0));
        let degraded = fixes.iter().filter(|f| f.integrity == 1).count();
        assert_eq!(degraded, 2);
        // Standing still at t = 0: no course.
        assert!(fixes[0].heading.is_nan());
    }
}
