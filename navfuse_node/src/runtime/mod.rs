// navfuse_node/src/runtime/mod.rs

//! Wires the core into threads: sensor producers → bus → fusion loop →
//! estimate board ← arbiter ← clients, with the map service on the side.

mod bus;
mod fusion_loop;
mod map_service;

pub use bus::{SensorBus, SensorPublisher};
pub use fusion_loop::{FusionLoop, FusionLoopStats};
pub use map_service::{spawn_map_service, RoadNetworkProvider};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::simulation::{spawn_producers, Pacer, SyntheticDrive};
use crossbeam_channel::{unbounded, Receiver};
use navfuse_core::fusion::PositioningStateMachine;
use navfuse_core::mapping::SharedMapCache;
use navfuse_core::messages::{Estimate, EstimateRequest};
use navfuse_core::server::{ArbiterClient, ArbiterError, ArbiterStats, EstimateBoard, RequestArbiter};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Knobs of a single run that are not part of the scenario.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Rate of the simulated external client, wall-clock Hz. 0 disables it.
    pub query_rate_hz: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { query_rate_hz: 2.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStats {
    pub answered: u64,
    pub not_available: u64,
}

/// Everything worth reporting after a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub seed: u64,
    pub samples_published: usize,
    pub fusion: FusionLoopStats,
    pub arbiter: ArbiterStats,
    pub client: ClientStats,
    /// Estimates pushed to the subscriber after GPS cycles.
    pub estimates_received: u64,
    pub map_refreshes: usize,
    /// Distance between the last published estimate and the true position.
    pub final_position_error_m: Option<f64>,
}

pub struct FusionNode {
    config: NodeConfig,
}

fn joined<T>(handle: JoinHandle<T>, name: &'static str) -> Result<T, NodeError> {
    handle.join().map_err(|_| NodeError::ThreadPanicked(name))
}

impl FusionNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Runs the synthetic drive to completion and shuts every thread down.
    pub fn run(&self, options: &RunOptions) -> Result<RunSummary, NodeError> {
        let config = &self.config;
        let scenario = &config.scenario;
        let drive = SyntheticDrive::new(scenario, config.fusion.wheel_radius_m)?;
        info!(
            seed = drive.seed(),
            duration_s = scenario.duration_s,
            time_scale = scenario.time_scale,
            "starting synthetic drive"
        );

        let provider = RoadNetworkProvider::from_config(
            &scenario.roads,
            Duration::from_millis(config.map_service.latency_ms),
        )?;

        // --- Shared state ---
        let board = EstimateBoard::new();
        let map = SharedMapCache::default();

        // --- Arbiter ---
        let mut arbiter = RequestArbiter::new(board.clone());
        let estimates = arbiter.subscribe();
        let client = arbiter.client();
        let shutdown = arbiter.shutdown_signal();
        let arbiter_handle = arbiter.spawn();

        // --- Map service ---
        let (map_tx, map_rx) = unbounded();
        let map_handle = spawn_map_service(provider, map.clone(), map_rx, shutdown.clone());

        // --- Fusion ---
        let machine = PositioningStateMachine::new(
            config.fusion.clone(),
            config.matcher.clone(),
            map,
            board,
        );
        let bus = SensorBus::new();
        let producers = spawn_producers(&drive, &bus, Pacer::new(scenario.time_scale), &shutdown);
        let fusion_handle = FusionLoop::new(machine, bus.into_receiver(), client.clone(), map_tx).spawn();

        // --- Consumers ---
        let consumer_handle = spawn_consumer(estimates);
        let client_handle = spawn_query_client(client.clone(), options.query_rate_hz);

        // --- Drain and shut down ---
        let mut samples_published = 0;
        for producer in producers {
            samples_published += joined(producer, "producer")?;
        }
        let fusion = joined(fusion_handle, "fusion")?;
        let accepted = client.submit(EstimateRequest::Shutdown);
        debug!(?accepted, "shutdown submitted");

        let arbiter_stats = arbiter_handle
            .join()
            .map_err(|_| NodeError::ThreadPanicked("arbiter"))?;
        let client_stats = joined(client_handle, "client")?;
        let estimates_received = joined(consumer_handle, "consumer")?;
        let map_refreshes = joined(map_handle, "map service")?;

        let final_position_error_m = fusion.last_estimate.as_ref().map(|estimate| {
            let truth = drive.truth_at(estimate.timestamp);
            (estimate.x - truth.x).hypot(estimate.y - truth.y)
        });

        Ok(RunSummary {
            seed: drive.seed(),
            samples_published,
            fusion,
            arbiter: arbiter_stats,
            client: client_stats,
            estimates_received,
            map_refreshes,
            final_position_error_m,
        })
    }
}

/// Stand-in for the transport collaborator: receives every estimate pushed
/// after a GPS cycle.
fn spawn_consumer(estimates: Receiver<Estimate>) -> JoinHandle<u64> {
    thread::Builder::new()
        .name("consumer".into())
        .spawn(move || {
            let mut received = 0;
            for estimate in estimates.iter() {
                received += 1;
                debug!(
                    t = estimate.timestamp,
                    x = estimate.x,
                    y = estimate.y,
                    heading = estimate.heading,
                    hypotheses = estimate.hypotheses,
                    matched = ?estimate.matched.as_ref().map(|m| m.segment),
                    "estimate"
                );
            }
            received
        })
        .expect("failed to spawn consumer thread")
}

/// A client polling the arbiter until the server shuts down.
fn spawn_query_client(client: ArbiterClient, rate_hz: f64) -> JoinHandle<ClientStats> {
    thread::Builder::new()
        .name("query-client".into())
        .spawn(move || {
            let mut stats = ClientStats::default();
            if !(rate_hz.is_finite() && rate_hz > 0.0) {
                return stats;
            }
            let period = Duration::from_secs_f64(1.0 / rate_hz);
            let shutdown = client.shutdown_signal();
            while !shutdown.is_raised() {
                match client.submit(EstimateRequest::ExternalQuery) {
                    Ok(_) => stats.answered += 1,
                    Err(ArbiterError::NotYetAvailable) => stats.not_available += 1,
                    Err(ArbiterError::ServerShuttingDown) => break,
                }
                thread::sleep(period);
            }
            stats
        })
        .expect("failed to spawn query client thread")
}
