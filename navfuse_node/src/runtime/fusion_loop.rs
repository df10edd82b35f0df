// navfuse_node/src/runtime/fusion_loop.rs

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use navfuse_core::fusion::{FusionError, PositioningStateMachine};
use navfuse_core::mapping::MapRequest;
use navfuse_core::messages::{Estimate, SensorSample};
use navfuse_core::server::{ArbiterClient, ShutdownSignal};
use navfuse_core::types::FusionState;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What the fusion thread did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionLoopStats {
    pub processed: u64,
    pub stale: u64,
    pub published: u64,
    pub internal_queries: u64,
    pub map_requests: u64,
    pub filter_errors: u64,
    pub final_state: FusionState,
    pub last_estimate: Option<Estimate>,
}

/// Owns the state machine and feeds it from the sensor bus, one sample at a
/// time. Stops when the bus disconnects or the shutdown flag is raised.
pub struct FusionLoop {
    machine: PositioningStateMachine,
    samples: Receiver<SensorSample>,
    arbiter: ArbiterClient,
    map_requests: Sender<MapRequest>,
    shutdown: ShutdownSignal,
}

impl FusionLoop {
    pub fn new(
        machine: PositioningStateMachine,
        samples: Receiver<SensorSample>,
        arbiter: ArbiterClient,
        map_requests: Sender<MapRequest>,
    ) -> Self {
        let shutdown = arbiter.shutdown_signal();
        Self {
            machine,
            samples,
            arbiter,
            map_requests,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<FusionLoopStats> {
        thread::Builder::new()
            .name("fusion".into())
            .spawn(move || self.run())
            .expect("failed to spawn fusion thread")
    }

    pub fn run(mut self) -> FusionLoopStats {
        let mut stats = FusionLoopStats::default();
        loop {
            if self.shutdown.is_raised() {
                debug!("shutdown raised, fusion loop stopping");
                break;
            }
            let sample = match self.samples.recv_timeout(POLL_INTERVAL) {
                Ok(sample) => sample,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            self.step(&sample, &mut stats);
        }
        stats.final_state = self.machine.state();
        stats
    }

    fn step(&mut self, sample: &SensorSample, stats: &mut FusionLoopStats) {
        match self.machine.process(sample) {
            Ok(outcome) => {
                stats.processed += 1;
                if let Some(estimate) = outcome.published {
                    stats.published += 1;
                    stats.last_estimate = Some(estimate);
                }
                if let Some(request) = outcome.internal_query {
                    stats.internal_queries += 1;
                    // The answer reaches consumers through the arbiter's
                    // subscribers, the ticket itself is not needed.
                    drop(self.arbiter.enqueue(request));
                }
                if let Some(request) = outcome.map_request {
                    stats.map_requests += 1;
                    if self.map_requests.send(request).is_err() {
                        debug!("map service gone, dropping map request");
                    }
                }
            }
            Err(FusionError::StaleSample { .. }) => {
                stats.stale += 1;
            }
            Err(err) => {
                stats.filter_errors += 1;
                error!(%err, "filter contract violation, resetting positioning");
                self.machine.reset();
            }
        }
    }
}
