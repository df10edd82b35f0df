// navfuse_core/src/mapping/matcher.rs

use super::{MapCache, MapError, SegmentHandle};
use crate::config::MatcherConfig;
use crate::utils::angles::{angle_diff, line_angle_distance, wrap_angle};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// The pose the matcher is asked to place on the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchQuery {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMatch {
    pub segment: SegmentHandle,
    /// Segment direction, flipped by π when the vehicle drives it backwards.
    pub heading: f64,
    /// Perpendicular distance to the closed segment, metres.
    pub distance: f64,
    /// Signed offset from the segment's supporting line, positive on the left.
    pub lateral_offset: f64,
    pub foot: Point2<f64>,
    pub score: f64,
}

/// Selects the road segment best explaining a position and heading.
///
/// The score of a segment is its perpendicular distance plus
/// `heading_weight_m_per_rad` times the heading disagreement, roads being
/// travelled in both directions. The lowest score wins; on a tie the first
/// segment in arena order is kept.
#[derive(Debug, Clone, Default)]
pub struct MapMatcher {
    config: MatcherConfig,
}

impl MapMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn match_estimate(&self, query: &MatchQuery, cache: &MapCache) -> Result<MapMatch, MapError> {
        if !cache.ready {
            return Err(MapError::NoCacheData);
        }
        let position = Point2::new(query.x, query.y);
        let mut best: Option<MapMatch> = None;

        for (handle, segment) in cache.segments() {
            let projection = segment.project(&position);
            if projection.distance > cache.radius {
                continue;
            }
            let penalty = line_angle_distance(query.heading, segment.theta);
            let score = projection.distance + self.config.heading_weight_m_per_rad * penalty;
            if best.as_ref().is_some_and(|b| score >= b.score) {
                continue;
            }
            let heading = if angle_diff(query.heading, segment.theta).abs() <= PI / 2.0 {
                segment.theta
            } else {
                wrap_angle(segment.theta + PI)
            };
            best = Some(MapMatch {
                segment: handle,
                heading,
                distance: projection.distance,
                lateral_offset: projection.lateral_offset,
                foot: projection.foot,
                score,
            });
        }

        best.ok_or(MapError::OutOfRange {
            x: query.x,
            y: query.y,
            radius: cache.radius,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Road;
    use approx::assert_abs_diff_eq;

    fn cross() -> MapCache {
        // One segment pointing east, one pointing north, both 5 m from (5, 5).
        let east = Road::from_polyline(0, &[Point2::new(0.0, 0.0), Point2::new(20.0, 0.0)]).unwrap();
        let north =
            Road::from_polyline(1, &[Point2::new(0.0, 0.0), Point2::new(0.0, 20.0)]).unwrap();
        MapCache::new(Point2::new(0.0, 0.0), 100.0, vec![east, north])
    }

    fn query(x: f64, y: f64, heading_deg: f64) -> MatchQuery {
        MatchQuery {
            x,
            y,
            heading: heading_deg.to_radians(),
        }
    }

    #[test]
    fn heading_breaks_the_distance_tie() {
        let matcher = MapMatcher::default();
        let m = matcher.match_estimate(&query(5.0, 5.0, 5.0), &cross()).unwrap();
        assert_eq!(m.segment, SegmentHandle { road: 0, segment: 0 });
        assert_abs_diff_eq!(m.heading, 0.0);
        assert_abs_diff_eq!(m.distance, 5.0, epsilon = 1e-12);

        let m = matcher.match_estimate(&query(5.0, 5.0, 85.0), &cross()).unwrap();
        assert_eq!(m.segment.road, 1);
    }

    #[test]
    fn roads_are_undirected() {
        let matcher = MapMatcher::default();
        let m = matcher.match_estimate(&query(5.0, 1.0, 178.0), &cross()).unwrap();
        assert_eq!(m.segment.road, 0);
        assert_abs_diff_eq!(m.heading, PI, epsilon = 1e-12);
    }

    #[test]
    fn exact_ties_go_to_the_lowest_index() {
        let matcher = MapMatcher::default();
        let two_pieces = Road::from_polyline(
            0,
            &[Point2::new(-10.0, 0.0), Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)],
        )
        .unwrap();
        let cache = MapCache::new(Point2::origin(), 50.0, vec![two_pieces]);
        let m = matcher.match_estimate(&query(0.0, 2.0, 0.0), &cache).unwrap();
        assert_eq!(m.segment, SegmentHandle { road: 0, segment: 0 });
    }

    #[test]
    fn unready_cache_has_no_data() {
        let mut cache = cross();
        cache.ready = false;
        assert_eq!(
            MapMatcher::default().match_estimate(&query(1.0, 1.0, 0.0), &cache),
            Err(MapError::NoCacheData)
        );
    }

    #[test]
    fn far_away_estimate_is_out_of_range() {
        let err = MapMatcher::default()
            .match_estimate(&query(500.0, 500.0, 0.0), &cross())
            .unwrap_err();
        assert!(matches!(err, MapError::OutOfRange { .. }));
    }
}
