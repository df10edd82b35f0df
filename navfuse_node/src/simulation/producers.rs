// navfuse_node/src/simulation/producers.rs

use super::SyntheticDrive;
use crate::runtime::{SensorBus, SensorPublisher};
use navfuse_core::messages::SensorSample;
use navfuse_core::server::ShutdownSignal;
use navfuse_core::types::SensorSource;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Maps simulated time onto the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    start: Instant,
    /// Simulated seconds per wall second; 0 disables pacing.
    time_scale: f64,
}

impl Pacer {
    pub fn new(time_scale: f64) -> Self {
        Self {
            start: Instant::now(),
            time_scale,
        }
    }

    pub fn wall_time(&self, sim_time: f64) -> Duration {
        if self.time_scale <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((sim_time / self.time_scale).max(0.0))
    }

    pub fn wait_until(&self, sim_time: f64) {
        let target = self.start + self.wall_time(sim_time);
        let now = Instant::now();
        if target > now {
            thread::sleep(target - now);
        }
    }
}

fn spawn_producer(
    source: SensorSource,
    samples: Vec<SensorSample>,
    publisher: SensorPublisher,
    pacer: Pacer,
    shutdown: ShutdownSignal,
) -> JoinHandle<usize> {
    let name = match source {
        SensorSource::Gps => "gps-producer",
        SensorSource::Abs => "abs-producer",
        SensorSource::Gyro => "gyro-producer",
    };
    thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let mut published = 0;
            for sample in samples {
                pacer.wait_until(sample.timestamp());
                if shutdown.is_raised() || !publisher.publish(sample) {
                    break;
                }
                published += 1;
            }
            debug!(?source, published, "producer finished");
            published
        })
        .expect("failed to spawn producer thread")
}

/// Starts one paced producer thread per sensor source. Each returns the
/// number of samples it published.
pub fn spawn_producers(
    drive: &SyntheticDrive,
    bus: &SensorBus,
    pacer: Pacer,
    shutdown: &ShutdownSignal,
) -> Vec<JoinHandle<usize>> {
    SensorSource::ALL
        .iter()
        .map(|&source| {
            spawn_producer(
                source,
                drive.samples(source),
                bus.publisher(),
                pacer,
                shutdown.clone(),
            )
        })
        .collect()
}
