// navfuse_core/src/mapping/mod.rs

//! Road network cache and map matching.
//!
//! Roads are stored in an arena (`MapCache::roads`) and addressed by stable
//! [`SegmentHandle`]s. The cache is only ever replaced as a whole, so a reader
//! holding a snapshot never observes a half-refreshed network.

use thiserror::Error;

mod cache;
mod matcher;
mod road;

pub use cache::{MapCache, MapProvider, MapRequest, SharedMapCache};
pub use matcher::{MapMatch, MapMatcher, MatchQuery};
pub use road::{Road, RoadSegment, SegmentHandle, SegmentProjection};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    #[error("map cache is not ready")]
    NoCacheData,
    #[error("no road within {radius} m of ({x:.1}, {y:.1})")]
    OutOfRange { x: f64, y: f64, radius: f64 },
    #[error("road {road} needs at least two distinct vertices")]
    InvalidGeometry { road: u32 },
    #[error("map provider failed: {0}")]
    Provider(String),
}
