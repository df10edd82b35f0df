// navfuse_node/src/runtime/map_service.rs

use crate::config::RoadConfig;
use crate::error::NodeError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use nalgebra::Point2;
use navfuse_core::mapping::{MapCache, MapError, MapProvider, MapRequest, Road, SharedMapCache};
use navfuse_core::server::ShutdownSignal;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Serves the scenario's road network, cropped to the requested area.
#[derive(Debug, Clone)]
pub struct RoadNetworkProvider {
    roads: Vec<Road>,
    latency: Duration,
}

impl RoadNetworkProvider {
    pub fn from_config(roads: &[RoadConfig], latency: Duration) -> Result<Self, NodeError> {
        let roads = roads
            .iter()
            .map(|road| {
                let vertices: Vec<Point2<f64>> =
                    road.vertices.iter().map(|&[x, y]| Point2::new(x, y)).collect();
                Road::from_polyline(road.id, &vertices)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { roads, latency })
    }
}

impl MapProvider for RoadNetworkProvider {
    fn fetch(&self, request: &MapRequest) -> Result<MapCache, MapError> {
        if !(request.radius.is_finite() && request.radius > 0.0) {
            return Err(MapError::Provider(format!(
                "invalid request radius {}",
                request.radius
            )));
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let roads = self
            .roads
            .iter()
            .filter(|road| road.distance_to(&request.center) <= request.radius)
            .cloned()
            .collect();
        Ok(MapCache::new(request.center, request.radius, roads))
    }
}

/// Background thread answering the state machine's map requests.
///
/// Requests that pile up while a fetch is running are collapsed into the
/// most recent one. Returns the number of successful refreshes.
pub fn spawn_map_service<P>(
    provider: P,
    cache: SharedMapCache,
    requests: Receiver<MapRequest>,
    shutdown: ShutdownSignal,
) -> JoinHandle<usize>
where
    P: MapProvider + 'static,
{
    thread::Builder::new()
        .name("map-service".into())
        .spawn(move || {
            let mut refreshes = 0;
            loop {
                let mut request = match requests.recv_timeout(POLL_INTERVAL) {
                    Ok(request) => request,
                    Err(RecvTimeoutError::Timeout) if !shutdown.is_raised() => continue,
                    Err(_) => break,
                };
                if let Some(latest) = requests.try_iter().last() {
                    request = latest;
                }
                match cache.refresh_from(&provider, &request) {
                    Ok(()) => {
                        refreshes += 1;
                        info!(
                            x = request.center.x,
                            y = request.center.y,
                            radius = request.radius,
                            "map cache refreshed"
                        );
                    }
                    Err(err) => warn!(%err, "map request failed"),
                }
            }
            refreshes
        })
        .expect("failed to spawn map service thread")
}
