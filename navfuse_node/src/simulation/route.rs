// navfuse_node/src/simulation/route.rs

use crate::error::NodeError;
use nalgebra::Point2;

/// A polyline parameterized by arc length.
#[derive(Debug, Clone)]
pub struct Route {
    points: Vec<Point2<f64>>,
    /// Arc length at each vertex; `cumulative[0] == 0`.
    cumulative: Vec<f64>,
}

impl Route {
    pub fn new(waypoints: &[[f64; 2]]) -> Result<Self, NodeError> {
        let mut points: Vec<Point2<f64>> = Vec::with_capacity(waypoints.len());
        for &[x, y] in waypoints {
            let p = Point2::new(x, y);
            if points.last().map_or(true, |last| (p - *last).norm() > f64::EPSILON) {
                points.push(p);
            }
        }
        if points.len() < 2 {
            return Err(NodeError::Scenario(
                "route needs two distinct waypoints".to_string(),
            ));
        }
        let mut cumulative = vec![0.0];
        for pair in points.windows(2) {
            let last = cumulative[cumulative.len() - 1];
            cumulative.push(last + (pair[1] - pair[0]).norm());
        }
        Ok(Self { points, cumulative })
    }

    pub fn length(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// Position and direction of travel after `s` metres, clamped to the route.
    pub fn pose_at(&self, s: f64) -> (Point2<f64>, f64) {
        let s = s.clamp(0.0, self.length());
        let leg = self
            .cumulative
            .windows(2)
            .position(|w| s < w[1])
            .unwrap_or(self.points.len() - 2);
        let (a, b) = (self.points[leg], self.points[leg + 1]);
        let d = b - a;
        let along = (s - self.cumulative[leg]) / d.norm();
        (a + d * along, d.y.atan2(d.x))
    }
}

/// Ground truth of the simulated vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruthState {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
}

/// Drives a route at constant speed after standing still for a while, then
/// stops at its end.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub route: Route,
    pub speed: f64,
    pub start_delay: f64,
}

impl Trajectory {
    pub fn state_at(&self, t: f64) -> TruthState {
        let driving = (t - self.start_delay).max(0.0);
        let s = self.speed * driving;
        let (p, heading) = self.route.pose_at(s);
        let moving = t >= self.start_delay && s < self.route.length();
        TruthState {
            t,
            x: p.x,
            y: p.y,
            heading,
            speed: if moving { self.speed } else { 0.0 },
        }
    }
}
