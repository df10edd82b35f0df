// navfuse_core/src/mapping/cache.rs

use super::{MapError, Road, RoadSegment, SegmentHandle};
use nalgebra::Point2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The road network around a centre point.
#[derive(Debug, Clone, PartialEq)]
pub struct MapCache {
    pub center: Point2<f64>,
    pub radius: f64,
    pub roads: Vec<Road>,
    /// A cache that is not ready must not be matched against.
    pub ready: bool,
}

impl Default for MapCache {
    fn default() -> Self {
        Self::empty()
    }
}

impl MapCache {
    /// A cache that has never been filled.
    pub fn empty() -> Self {
        Self {
            center: Point2::origin(),
            radius: 0.0,
            roads: Vec::new(),
            ready: false,
        }
    }

    pub fn new(center: Point2<f64>, radius: f64, roads: Vec<Road>) -> Self {
        Self {
            center,
            radius,
            roads,
            ready: true,
        }
    }

    pub fn segment(&self, handle: SegmentHandle) -> Option<&RoadSegment> {
        self.roads.get(handle.road)?.segments.get(handle.segment)
    }

    /// Every segment with its handle, roads first, then segments, both in
    /// ascending index order.
    pub fn segments(&self) -> impl Iterator<Item = (SegmentHandle, &RoadSegment)> + '_ {
        self.roads.iter().enumerate().flat_map(|(road, r)| {
            r.segments
                .iter()
                .enumerate()
                .map(move |(segment, s)| (SegmentHandle { road, segment }, s))
        })
    }

    pub fn segment_count(&self) -> usize {
        self.roads.iter().map(|r| r.segments.len()).sum()
    }

    /// Whether a position has left the cached area, or there is nothing
    /// cached at all.
    pub fn needs_refresh(&self, x: f64, y: f64) -> bool {
        !self.ready || (Point2::new(x, y) - self.center).norm() > self.radius
    }
}

/// Ask the map provider for the roads around a centre point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapRequest {
    pub center: Point2<f64>,
    pub radius: f64,
}

/// External source of road geometry keyed by centre and radius.
pub trait MapProvider: Send + Sync {
    fn fetch(&self, request: &MapRequest) -> Result<MapCache, MapError>;
}

/// The map cache shared between the map service (single writer) and the
/// state machine (reader).
///
/// Readers take a [`snapshot`](Self::snapshot) and match against it without
/// holding the lock; a refresh swaps in a complete new cache.
#[derive(Debug, Clone, Default)]
pub struct SharedMapCache {
    inner: Arc<RwLock<Arc<MapCache>>>,
}

impl SharedMapCache {
    pub fn new(cache: MapCache) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(cache))),
        }
    }

    pub fn snapshot(&self) -> Arc<MapCache> {
        Arc::clone(&self.inner.read())
    }

    pub fn replace(&self, cache: MapCache) {
        debug!(
            roads = cache.roads.len(),
            radius = cache.radius,
            "swapping in refreshed map cache"
        );
        let cache = Arc::new(cache);
        *self.inner.write() = cache;
    }

    /// Marks the cache as unusable until the next refresh.
    pub fn invalidate(&self) {
        let mut guard = self.inner.write();
        if guard.ready {
            let mut stale = MapCache::clone(&guard);
            stale.ready = false;
            *guard = Arc::new(stale);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    /// Fetches a fresh cache from `provider` and swaps it in. The previous
    /// cache stays visible if the provider fails.
    pub fn refresh_from<P: MapProvider + ?Sized>(
        &self,
        provider: &P,
        request: &MapRequest,
    ) -> Result<(), MapError> {
        let cache = provider.fetch(request)?;
        self.replace(cache);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_road() -> Road {
        Road::from_polyline(0, &[Point2::new(0.0, 0.0), Point2::new(100.0, 0.0)]).unwrap()
    }

    struct FixedProvider;

    impl MapProvider for FixedProvider {
        fn fetch(&self, request: &MapRequest) -> Result<MapCache, MapError> {
            Ok(MapCache::new(request.center, request.radius, vec![straight_road()]))
        }
    }

    struct FailingProvider;

    impl MapProvider for FailingProvider {
        fn fetch(&self, _: &MapRequest) -> Result<MapCache, MapError> {
            Err(MapError::Provider("offline".into()))
        }
    }

    #[test]
    fn empty_cache_always_needs_refresh() {
        assert!(MapCache::empty().needs_refresh(0.0, 0.0));
        let cache = MapCache::new(Point2::new(0.0, 0.0), 50.0, vec![straight_road()]);
        assert!(!cache.needs_refresh(30.0, 30.0));
        assert!(cache.needs_refresh(40.0, 40.0));
    }

    #[test]
    fn snapshots_survive_a_swap() {
        let shared = SharedMapCache::default();
        let before = shared.snapshot();
        assert!(!before.ready);

        let request = MapRequest {
            center: Point2::new(10.0, 0.0),
            radius: 200.0,
        };
        shared.refresh_from(&FixedProvider, &request).unwrap();
        assert!(!before.ready);
        assert!(shared.is_ready());
        assert_eq!(shared.snapshot().segment_count(), 1);
    }

    #[test]
    fn failed_refresh_keeps_previous_cache() {
        let shared = SharedMapCache::new(MapCache::new(
            Point2::origin(),
            100.0,
            vec![straight_road()],
        ));
        let request = MapRequest {
            center: Point2::origin(),
            radius: 100.0,
        };
        assert!(shared.refresh_from(&FailingProvider, &request).is_err());
        assert!(shared.is_ready());

        shared.invalidate();
        assert!(!shared.is_ready());
        assert_eq!(shared.snapshot().roads.len(), 1);
    }
}
