// navfuse_core/src/mapping/road.rs

use super::MapError;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Stable address of a segment inside a [`super::MapCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentHandle {
    /// Index of the road in the cache arena.
    pub road: usize,
    /// Index of the segment within its road.
    pub segment: usize,
}

/// A straight piece of road between two vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadSegment {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
    /// Position of the segment within its road.
    pub index: usize,
    /// Direction from `start` to `end`, radians in (-π, π].
    pub theta: f64,
}

/// Where a point falls relative to a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    /// Closest point of the closed segment.
    pub foot: Point2<f64>,
    /// Distance from the point to `foot`.
    pub distance: f64,
    /// Signed distance to the segment's supporting line, positive on the left.
    pub lateral_offset: f64,
}

impl RoadSegment {
    pub fn new(index: usize, start: Point2<f64>, end: Point2<f64>) -> Self {
        let d = end - start;
        Self {
            start,
            end,
            index,
            theta: d.y.atan2(d.x),
        }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Unit vector along the segment.
    pub fn direction(&self) -> Vector2<f64> {
        Vector2::new(self.theta.cos(), self.theta.sin())
    }

    /// Signed distance of `p` to the infinite line through the segment.
    pub fn lateral_offset(&self, p: &Point2<f64>) -> f64 {
        let u = self.direction();
        let r = p - self.start;
        u.x * r.y - u.y * r.x
    }

    pub fn project(&self, p: &Point2<f64>) -> SegmentProjection {
        let u = self.direction();
        let along = (p - self.start).dot(&u).clamp(0.0, self.length());
        let foot = self.start + u * along;
        SegmentProjection {
            foot,
            distance: (p - foot).norm(),
            lateral_offset: self.lateral_offset(p),
        }
    }
}

/// One polyline of the road network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Road {
    pub id: u32,
    pub segments: Vec<RoadSegment>,
}

impl Road {
    /// Builds a road from its vertices. Repeated vertices are skipped; at
    /// least two distinct ones are required.
    pub fn from_polyline(id: u32, vertices: &[Point2<f64>]) -> Result<Self, MapError> {
        let mut segments = Vec::with_capacity(vertices.len().saturating_sub(1));
        for pair in vertices.windows(2) {
            if (pair[1] - pair[0]).norm() <= f64::EPSILON {
                continue;
            }
            segments.push(RoadSegment::new(segments.len(), pair[0], pair[1]));
        }
        if segments.is_empty() {
            return Err(MapError::InvalidGeometry { road: id });
        }
        Ok(Self { id, segments })
    }

    /// Shortest distance from `p` to any segment of the road.
    pub fn distance_to(&self, p: &Point2<f64>) -> f64 {
        self.segments
            .iter()
            .map(|s| s.project(p).distance)
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn projection_clamps_to_endpoints() {
        let s = RoadSegment::new(0, Point2::new(0.0, 0.0), Point2::new(10.0, 0.0));
        let inside = s.project(&Point2::new(4.0, 3.0));
        assert_abs_diff_eq!(inside.distance, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inside.lateral_offset, 3.0, epsilon = 1e-12);

        let beyond = s.project(&Point2::new(13.0, -4.0));
        assert_abs_diff_eq!(beyond.foot.x, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(beyond.distance, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(beyond.lateral_offset, -4.0, epsilon = 1e-12);
    }

    #[test]
    fn polyline_skips_repeated_vertices() {
        let road = Road::from_polyline(
            7,
            &[
                Point2::new(0.0, 0.0),
                Point2::new(0.0, 0.0),
                Point2::new(0.0, 5.0),
                Point2::new(5.0, 5.0),
            ],
        )
        .unwrap();
        assert_eq!(road.segments.len(), 2);
        assert_eq!(road.segments[1].index, 1);
        assert_abs_diff_eq!(road.segments[0].theta, FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_polyline_is_rejected() {
        assert_eq!(
            Road::from_polyline(3, &[Point2::new(1.0, 1.0)]),
            Err(MapError::InvalidGeometry { road: 3 })
        );
    }
}
