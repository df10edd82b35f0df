// navfuse_core/src/fusion/machine.rs

use super::bootstrap::Bootstrap;
use super::{FusionError, StepOutcome};
use crate::config::{FusionConfig, MatcherConfig, RenormalizationCadence};
use crate::estimation::{
    predict_in_place, update_in_place, FilterError, HypothesisSet, MeasurementModel,
    PredictionModel,
};
use crate::mapping::{MapError, MapMatch, MapMatcher, MapRequest, MatchQuery, SharedMapCache};
use crate::messages::{AbsReading, Estimate, EstimateRequest, GpsFix, GyroReading, SensorSample};
use crate::models::dynamics::{ConstantPositionModel, ControlInputs, OdometricModel};
use crate::models::measurement::{GpsPoseModel, GpsPositionModel, RoadConstraintModel};
use crate::server::EstimateBoard;
use crate::types::{FusionState, State, StateVariable, Timestamp};
use crate::utils::angles::{angle_diff, weighted_circular_mean, wrap_angle};
use nalgebra::{DMatrix, Matrix3, Point2};
use tracing::{debug, info, trace, warn};

/// Heading variance of a hypothesis created without any heading information.
const UNKNOWN_HEADING_VARIANCE: f64 = std::f64::consts::PI * std::f64::consts::PI;

/// The single writer of the fusion state.
///
/// Samples must be fed from one merge point in arrival order. Each call to
/// [`process`](Self::process) runs to completion before the next one starts.
#[derive(Debug)]
pub struct PositioningStateMachine {
    config: FusionConfig,
    matcher: MapMatcher,
    map: SharedMapCache,
    board: EstimateBoard,

    state: FusionState,
    hypotheses: HypothesisSet,
    /// Time the hypotheses are valid at. `None` until the first usable fix.
    filter_time: Option<Timestamp>,
    /// Last processed timestamp per source, indexed by `SensorSource::slot`.
    last_seen: [Option<Timestamp>; 3],
    last_gps: Option<Timestamp>,
    controls: ControlInputs,
    bootstrap: Option<Bootstrap>,
    last_map_request: Option<(MapRequest, Timestamp)>,
}

impl PositioningStateMachine {
    pub fn new(
        config: FusionConfig,
        matcher_config: MatcherConfig,
        map: SharedMapCache,
        board: EstimateBoard,
    ) -> Self {
        let capacity = config.max_hypotheses.max(1);
        board.set_state(FusionState::ColdStart);
        Self {
            config,
            matcher: MapMatcher::new(matcher_config),
            map,
            board,
            state: FusionState::ColdStart,
            hypotheses: HypothesisSet::allocate(capacity),
            filter_time: None,
            last_seen: [None; 3],
            last_gps: None,
            controls: ControlInputs::default(),
            bootstrap: None,
            last_map_request: None,
        }
    }

    // --- Accessors ---

    pub fn state(&self) -> FusionState {
        self.state
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn hypotheses(&self) -> &HypothesisSet {
        &self.hypotheses
    }

    pub fn filter_time(&self) -> Option<Timestamp> {
        self.filter_time
    }

    pub fn board(&self) -> &EstimateBoard {
        &self.board
    }

    /// Drops every hypothesis and returns to `ColdStart`. Per-source
    /// ordering and the latest control inputs are kept.
    pub fn reset(&mut self) {
        if self.state != FusionState::ColdStart {
            info!(from = ?self.state, "positioning reset to ColdStart");
        }
        self.state = FusionState::ColdStart;
        self.hypotheses.clear();
        self.filter_time = None;
        self.last_gps = None;
        self.bootstrap = None;
        self.board.set_state(FusionState::ColdStart);
    }

    // =========================================================================
    // == Sample Dispatch ==
    // =========================================================================

    /// Processes one decoded sample.
    ///
    /// A sample older than the last one processed from the same source is
    /// rejected with [`FusionError::StaleSample`] and leaves the machine
    /// untouched.
    pub fn process(&mut self, sample: &SensorSample) -> Result<StepOutcome, FusionError> {
        let source = sample.source();
        let timestamp = sample.timestamp();
        if let Some(last) = self.last_seen[source.slot()] {
            if timestamp < last {
                debug!(?source, timestamp, last, "rejecting out-of-order sample");
                return Err(FusionError::StaleSample {
                    sensor: source,
                    timestamp,
                    last,
                });
            }
        }
        self.last_seen[source.slot()] = Some(timestamp);

        if self.state.is_tracking() {
            if let Some(last_gps) = self.last_gps {
                if timestamp - last_gps > self.config.gps_staleness_s {
                    warn!(
                        silence_s = timestamp - last_gps,
                        "no GPS within the staleness window"
                    );
                    self.reset();
                }
            }
        }

        match (self.state, sample) {
            (FusionState::ColdStart, SensorSample::Gps(fix)) => self.cold_start_gps(fix),
            (FusionState::ColdStart, _) => {
                self.cache_control(sample);
                Ok(StepOutcome::quiet(self.state))
            }
            (FusionState::Initializing, SensorSample::Gps(fix)) => self.initializing_gps(fix),
            (FusionState::Initializing, _) => self.initializing_motion(sample),
            (FusionState::Tracking, SensorSample::Gps(fix)) => self.tracking_gps(fix),
            (FusionState::Tracking, _) => self.tracking_motion(sample),
        }
    }

    // --- ColdStart ---

    fn cold_start_gps(&mut self, fix: &GpsFix) -> Result<StepOutcome, FusionError> {
        if !self.accept_fix(fix) {
            return Ok(StepOutcome::quiet(self.state));
        }

        let (heading, heading_var) = if fix.has_heading() {
            (wrap_angle(fix.heading), fix.sigma_heading.powi(2))
        } else {
            (0.0, UNKNOWN_HEADING_VARIANCE)
        };
        let covariance = fix_covariance(fix, heading_var);
        let mean = State::from_vec(vec![fix.x, fix.y, heading]);
        self.hypotheses = HypothesisSet::single(mean, covariance, self.config.max_hypotheses);
        self.filter_time = Some(fix.timestamp);
        self.last_gps = Some(fix.timestamp);
        self.bootstrap = Some(Bootstrap::new(*fix, heading));
        self.transition(FusionState::Initializing);

        let map_request = self.map_request_for(fix.x, fix.y, fix.timestamp);
        Ok(StepOutcome {
            map_request,
            ..StepOutcome::quiet(self.state)
        })
    }

    // --- Initializing ---

    fn initializing_motion(&mut self, sample: &SensorSample) -> Result<StepOutcome, FusionError> {
        self.age_bootstrap(sample.timestamp())?;
        self.cache_control(sample);
        self.try_enter_tracking()
    }

    fn initializing_gps(&mut self, fix: &GpsFix) -> Result<StepOutcome, FusionError> {
        if !self.accept_fix(fix) {
            return Ok(StepOutcome::quiet(self.state));
        }
        self.age_bootstrap(fix.timestamp)?;

        let model = GpsPositionModel {
            fix: *fix,
            gate_sigma: self.config.gps_gate_sigma,
        };
        if let Err(err) = self.apply_update(&model).and_then(|_| self.hypotheses.normalize()) {
            self.recover(err, fix)?;
        }
        self.last_gps = Some(fix.timestamp);
        if let Some(bootstrap) = self.bootstrap.as_mut() {
            bootstrap.record_fix(*fix);
        }

        let map_request = self.map_request_for(fix.x, fix.y, fix.timestamp);
        let mut outcome = self.try_enter_tracking()?;
        outcome.map_request = outcome.map_request.or(map_request);
        Ok(outcome)
    }

    /// Predicts the bootstrap hypothesis to `timestamp` without moving it and
    /// feeds the elapsed motion to the heading bootstrap.
    fn age_bootstrap(&mut self, timestamp: Timestamp) -> Result<(), FusionError> {
        let dt = self.advance_clock(timestamp);
        if dt <= 0.0 {
            return Ok(());
        }
        let model = ConstantPositionModel {
            dt,
            speed: self.controls.speed,
            yaw_rate: self.controls.yaw_rate,
            travelled_before: self
                .bootstrap
                .as_ref()
                .map_or(0.0, Bootstrap::travelled_since_fix),
            position_random_walk: self.config.position_random_walk,
            yaw_rate_noise_std: self.config.yaw_rate_noise_std,
        };
        self.apply_prediction(&model)?;
        if let Some(bootstrap) = self.bootstrap.as_mut() {
            bootstrap.integrate(self.controls.speed, self.controls.yaw_rate, dt);
        }
        Ok(())
    }

    fn try_enter_tracking(&mut self) -> Result<StepOutcome, FusionError> {
        let Some(bootstrap) = self.bootstrap.as_ref() else {
            return Ok(StepOutcome::quiet(self.state));
        };
        if bootstrap.net_displacement() < self.config.heading_init_distance_m {
            return Ok(StepOutcome::quiet(self.state));
        }
        let Some(seed) = self.hypotheses.most_likely().cloned() else {
            return Ok(StepOutcome::quiet(self.state));
        };

        let (set, source) = bootstrap.split(&seed, &self.config)?;
        info!(
            travelled_m = bootstrap.travelled(),
            displacement_m = bootstrap.net_displacement(),
            heading_source = ?source,
            hypotheses = set.len(),
            "heading observable"
        );
        self.hypotheses = set;
        self.bootstrap = None;
        self.transition(FusionState::Tracking);

        let published = self.publish(None)?;
        Ok(StepOutcome {
            published: Some(published),
            ..StepOutcome::quiet(self.state)
        })
    }

    // --- Tracking ---

    fn tracking_motion(&mut self, sample: &SensorSample) -> Result<StepOutcome, FusionError> {
        self.dead_reckon(sample.timestamp())?;
        self.cache_control(sample);
        let published = self.publish(None)?;
        Ok(StepOutcome {
            published: Some(published),
            ..StepOutcome::quiet(self.state)
        })
    }

    fn tracking_gps(&mut self, fix: &GpsFix) -> Result<StepOutcome, FusionError> {
        if !self.accept_fix(fix) {
            return Ok(StepOutcome::quiet(self.state));
        }
        self.dead_reckon(fix.timestamp)?;
        self.last_gps = Some(fix.timestamp);

        let matched = match self.gps_cycle(fix) {
            Ok(matched) => matched,
            Err(err) => {
                self.recover(err, fix)?;
                None
            }
        };

        let published = self.publish(matched)?;
        let map_request = self.map_request_for(published.x, published.y, fix.timestamp);
        Ok(StepOutcome {
            published: Some(published),
            internal_query: Some(EstimateRequest::InternalQuery),
            map_request,
            ..StepOutcome::quiet(self.state)
        })
    }

    /// Update, map match, road constraint and renormalization of one GPS
    /// sample. The hypotheses are already predicted to the fix time.
    fn gps_cycle(&mut self, fix: &GpsFix) -> Result<Option<MapMatch>, FilterError> {
        let gate_sigma = self.config.gps_gate_sigma;
        if self.course_usable(fix) {
            self.apply_update(&GpsPoseModel {
                fix: *fix,
                gate_sigma,
            })?;
        } else {
            self.apply_update(&GpsPositionModel {
                fix: *fix,
                gate_sigma,
            })?;
        }

        let matched = self.match_on_map()?;
        if let Some(m) = matched.as_ref().filter(|_| self.config.road_constraint) {
            let snapshot = self.map.snapshot();
            if let Some(segment) = snapshot.segment(m.segment) {
                let model = RoadConstraintModel {
                    segment: segment.clone(),
                    half_width: self.config.road_half_width_m,
                    gate_sigma,
                };
                self.apply_update(&model)?;
            }
        }

        if self.config.renormalization == RenormalizationCadence::PerCycle {
            self.hypotheses.normalize()?;
        }
        let pruned = self.hypotheses.prune(self.config.prune_weight);
        if pruned > 0 {
            trace!(pruned, remaining = self.hypotheses.len(), "pruned hypotheses");
            self.hypotheses.normalize()?;
        }
        Ok(matched)
    }

    fn match_on_map(&self) -> Result<Option<MapMatch>, FilterError> {
        let estimate = self.hypotheses.estimate()?;
        let query = MatchQuery {
            x: estimate[StateVariable::Px.index()],
            y: estimate[StateVariable::Py.index()],
            heading: self.mean_heading(),
        };
        let snapshot = self.map.snapshot();
        match self.matcher.match_estimate(&query, &snapshot) {
            Ok(m) => {
                trace!(segment = ?m.segment, score = m.score, "map matched");
                Ok(Some(m))
            }
            Err(err @ (MapError::NoCacheData | MapError::OutOfRange { .. })) => {
                debug!(%err, "no road to match, publishing without segment");
                Ok(None)
            }
            Err(err) => {
                warn!(%err, "map match failed, publishing without segment");
                Ok(None)
            }
        }
    }

    fn course_usable(&self, fix: &GpsFix) -> bool {
        fix.has_heading()
            && fix.sigma_heading <= self.config.max_gps_heading_std
            && self.controls.speed.abs() >= self.config.min_course_speed_mps
    }

    fn dead_reckon(&mut self, timestamp: Timestamp) -> Result<(), FusionError> {
        let dt = self.advance_clock(timestamp);
        if dt <= 0.0 {
            return Ok(());
        }
        let model = OdometricModel {
            dt,
            speed: self.controls.speed,
            yaw_rate: self.controls.yaw_rate,
            speed_noise_std: self.config.speed_noise_std,
            yaw_rate_noise_std: self.config.yaw_rate_noise_std,
        };
        self.apply_prediction(&model)?;
        Ok(())
    }

    // =========================================================================
    // == Shared Helpers ==
    // =========================================================================

    /// Integrity check shared by every state. Low-quality fixes are dropped.
    fn accept_fix(&self, fix: &GpsFix) -> bool {
        if fix.integrity < self.config.integrity_threshold {
            debug!(
                integrity = fix.integrity,
                threshold = self.config.integrity_threshold,
                state = ?self.state,
                "discarding low-integrity GPS fix"
            );
            return false;
        }
        true
    }

    fn cache_control(&mut self, sample: &SensorSample) {
        match sample {
            SensorSample::Abs(reading) => self.apply_abs(reading),
            SensorSample::Gyro(reading) => self.apply_gyro(reading),
            SensorSample::Gps(_) => {}
        }
    }

    fn apply_abs(&mut self, reading: &AbsReading) {
        self.controls.apply_abs(reading, self.config.wheel_radius_m);
    }

    fn apply_gyro(&mut self, reading: &GyroReading) {
        self.controls.apply_gyro(reading);
    }

    /// Moves the filter clock forward and returns the elapsed time. A sample
    /// behind the clock advances nothing.
    fn advance_clock(&mut self, timestamp: Timestamp) -> f64 {
        match self.filter_time {
            Some(now) if timestamp > now => {
                self.filter_time = Some(timestamp);
                timestamp - now
            }
            Some(_) => 0.0,
            None => {
                self.filter_time = Some(timestamp);
                0.0
            }
        }
    }

    fn apply_prediction<M: PredictionModel>(&mut self, model: &M) -> Result<(), FilterError> {
        predict_in_place(model, &mut self.hypotheses)?;
        wrap_headings(&mut self.hypotheses);
        Ok(())
    }

    fn apply_update<M: MeasurementModel>(&mut self, model: &M) -> Result<(), FilterError> {
        let report = update_in_place(model, &mut self.hypotheses)?;
        trace!(
            coherent = report.coherent,
            max_likelihood = report.max_likelihood(),
            "measurement update"
        );
        wrap_headings(&mut self.hypotheses);
        if self.config.renormalization == RenormalizationCadence::PerUpdate {
            self.hypotheses.normalize()?;
        }
        Ok(())
    }

    /// Recovers from a failed GPS cycle. Degenerate weights reseed a single
    /// wide hypothesis at the fix; anything else is a contract violation.
    fn recover(&mut self, err: FilterError, fix: &GpsFix) -> Result<(), FusionError> {
        if err != FilterError::DegenerateWeights {
            return Err(err.into());
        }
        let heading = if fix.has_heading() {
            wrap_angle(fix.heading)
        } else {
            self.mean_heading()
        };
        warn!(
            x = fix.x,
            y = fix.y,
            heading,
            "every hypothesis rejected the fix, reseeding"
        );
        let heading_var = self.config.initial_heading_std.powi(2);
        let mut covariance = fix_covariance(fix, heading_var);
        covariance.view_mut((0, 0), (2, 2)).scale_mut(4.0);
        self.hypotheses = HypothesisSet::single(
            State::from_vec(vec![fix.x, fix.y, heading]),
            covariance,
            self.config.max_hypotheses,
        );
        Ok(())
    }

    /// Weighted circular mean of the hypothesis headings.
    fn mean_heading(&self) -> f64 {
        let th = StateVariable::Heading.index();
        weighted_circular_mean(self.hypotheses.iter().map(|h| (h.mean[th], h.weight)))
            .or_else(|| self.hypotheses.most_likely().map(|h| h.mean[th]))
            .unwrap_or(0.0)
    }

    fn summarize(&self, matched: Option<MapMatch>) -> Result<Estimate, FilterError> {
        let th = StateVariable::Heading.index();
        let reference = self
            .hypotheses
            .most_likely()
            .ok_or(FilterError::EmptySet)?
            .mean[th];

        // Heading spread must be measured on one branch of the circle.
        let mut unwrapped = self.hypotheses.clone();
        for h in unwrapped.iter_mut() {
            h.mean[th] = reference + angle_diff(h.mean[th], reference);
        }
        let mean = unwrapped.estimate()?;
        let covariance = unwrapped.mixture_covariance()?;

        Ok(Estimate {
            timestamp: self.filter_time.unwrap_or_default(),
            x: mean[StateVariable::Px.index()],
            y: mean[StateVariable::Py.index()],
            heading: wrap_angle(self.mean_heading()),
            covariance: Matrix3::from_iterator(covariance.iter().copied()),
            hypotheses: self.hypotheses.len(),
            state: self.state,
            matched,
        })
    }

    fn publish(&self, matched: Option<MapMatch>) -> Result<Estimate, FilterError> {
        let estimate = self.summarize(matched)?;
        self.board.publish(estimate.clone());
        Ok(estimate)
    }

    fn transition(&mut self, next: FusionState) {
        info!(from = ?self.state, to = ?next, "positioning state change");
        self.state = next;
        self.board.set_state(next);
    }

    /// Asks for a new map area when the position left the cached one. A
    /// request is not repeated for the same area until the staleness window
    /// has passed.
    fn map_request_for(&mut self, x: f64, y: f64, now: Timestamp) -> Option<MapRequest> {
        if !self.map.snapshot().needs_refresh(x, y) {
            return None;
        }
        let position = Point2::new(x, y);
        if let Some((pending, at)) = &self.last_map_request {
            let inside = (position - pending.center).norm() <= 0.5 * pending.radius;
            if inside && now - at <= self.config.gps_staleness_s {
                return None;
            }
        }
        let request = MapRequest {
            center: position,
            radius: self.config.map_radius_m,
        };
        debug!(x, y, radius = request.radius, "requesting map area");
        self.last_map_request = Some((request, now));
        Some(request)
    }

    #[cfg(test)]
    pub(crate) fn source_time(&self, source: crate::types::SensorSource) -> Option<Timestamp> {
        self.last_seen[source.slot()]
    }
}

fn fix_covariance(fix: &GpsFix, heading_var: f64) -> DMatrix<f64> {
    let position = fix.position_covariance();
    let mut covariance = DMatrix::zeros(3, 3);
    for r in 0..2 {
        for c in 0..2 {
            covariance[(r, c)] = position[(r, c)];
        }
    }
    covariance[(2, 2)] = heading_var;
    covariance
}

fn wrap_headings(set: &mut HypothesisSet) {
    let th = StateVariable::Heading.index();
    for hypothesis in set.iter_mut() {
        let wrapped = wrap_angle(hypothesis.mean[th]);
        hypothesis.mean[th] = wrapped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorSource;
    use approx::assert_abs_diff_eq;

    const WHEEL_RADIUS: f64 = 0.3;

    fn machine() -> PositioningStateMachine {
        PositioningStateMachine::new(
            FusionConfig::default(),
            MatcherConfig::default(),
            SharedMapCache::default(),
            EstimateBoard::new(),
        )
    }

    fn gps(t: f64, x: f64, y: f64, integrity: i32) -> SensorSample {
        SensorSample::Gps(GpsFix {
            x,
            y,
            heading: f64::NAN,
            sigma_x: 1.0,
            sigma_y: 1.0,
            sigma_xy: 0.0,
            sigma_heading: f64::NAN,
            integrity,
            timestamp: t,
        })
    }

    fn abs(t: f64, speed: f64) -> SensorSample {
        let rate = speed / WHEEL_RADIUS;
        SensorSample::Abs(AbsReading {
            left: rate,
            right: rate,
            timestamp: t,
        })
    }

    fn gyro(t: f64, yaw_rate: f64) -> SensorSample {
        SensorSample::Gyro(GyroReading {
            yaw_rate,
            timestamp: t,
        })
    }

    /// Drives a fresh machine into `Tracking` at 3 m/s. Returns the time of
    /// the last processed sample.
    fn tracking_machine() -> (PositioningStateMachine, f64) {
        let mut m = machine();
        m.process(&gps(0.0, 0.0, 0.0, 5)).unwrap();
        for i in 1..=20 {
            let t = 0.1 * i as f64;
            let outcome = m.process(&abs(t, 3.0)).unwrap();
            if outcome.state.is_tracking() {
                return (m, t);
            }
        }
        panic!("machine never reached Tracking");
    }

    #[test]
    fn integrity_threshold_gates_cold_start() {
        let mut m = machine();
        let outcome = m.process(&gps(0.0, 1.0, 2.0, 2)).unwrap();
        assert_eq!(outcome.state, FusionState::ColdStart);
        assert!(m.hypotheses().is_empty());

        let outcome = m.process(&gps(1.0, 1.0, 2.0, 4)).unwrap();
        assert_eq!(outcome.state, FusionState::Initializing);
        assert!(outcome.published.is_none());
        assert!(outcome.map_request.is_some());
        assert_eq!(m.hypotheses().len(), 1);
        assert_eq!(m.board().state(), FusionState::Initializing);
    }

    #[test]
    fn standing_still_never_observes_heading() {
        let mut m = machine();
        m.process(&gps(0.0, 0.0, 0.0, 5)).unwrap();
        for i in 1..200 {
            let t = 0.05 * i as f64;
            m.process(&abs(t, 0.0)).unwrap();
            m.process(&gyro(t, 0.1)).unwrap();
        }
        assert_eq!(m.state(), FusionState::Initializing);
        assert!(m.board().latest().is_none());
    }

    #[test]
    fn driving_forward_and_back_never_observes_heading() {
        let mut m = machine();
        m.process(&gps(0.0, 0.0, 0.0, 5)).unwrap();
        // Cached speeds per 0.1 s interval: 0, +3, +3, -3, -3. Net 0 m over
        // 1.2 m of path.
        for (t, speed) in [(0.1, 3.0), (0.2, 3.0), (0.3, -3.0), (0.4, -3.0), (0.5, 0.0)] {
            let outcome = m.process(&abs(t, speed)).unwrap();
            assert_eq!(outcome.state, FusionState::Initializing, "t = {t}");
        }
        assert!(m.board().latest().is_none());

        // Driving on from here does make the heading observable.
        let mut t = 0.5;
        while !m.state().is_tracking() && t < 2.0 {
            t += 0.1;
            m.process(&abs(t, 3.0)).unwrap();
        }
        assert_eq!(m.state(), FusionState::Tracking);
    }

    #[test]
    fn bootstrap_uncertainty_covers_the_distance_driven() {
        let mut m = machine();
        m.process(&gps(0.0, 0.0, 0.0, 5)).unwrap();
        // 1 m of path at 100 Hz, while still below the observability
        // threshold because the vehicle turns back halfway.
        for i in 1..=100 {
            let t = 0.01 * i as f64;
            let speed = if i <= 50 { 1.0 } else { -1.0 };
            m.process(&abs(t, speed)).unwrap();
        }
        assert_eq!(m.state(), FusionState::Initializing);
        let p = &m.hypotheses().get(0).unwrap().covariance;
        let random_walk = m.config().position_random_walk * 1.0;
        // Initial 1 m², the random walk and (0.99 m)² of unknown direction;
        // the first interval still used the zero control.
        assert_abs_diff_eq!(p[(0, 0)], 1.0 + random_walk + 0.99 * 0.99, epsilon = 1e-9);
    }

    #[test]
    fn stale_samples_are_rejected_before_tracking() {
        let mut m = machine();
        m.process(&gyro(1.0, 0.0)).unwrap();
        let err = m.process(&gyro(0.5, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            FusionError::StaleSample {
                sensor: SensorSource::Gyro,
                ..
            }
        ));

        // A discarded low-integrity fix still advances the GPS source clock.
        m.process(&gps(2.0, 0.0, 0.0, 1)).unwrap();
        assert!(m.process(&gps(1.5, 0.0, 0.0, 5)).is_err());
        assert_eq!(m.state(), FusionState::ColdStart);
        assert!(m.hypotheses().is_empty());

        m.process(&gps(3.0, 0.0, 0.0, 5)).unwrap();
        m.process(&abs(3.2, 3.0)).unwrap();
        assert_eq!(m.state(), FusionState::Initializing);
        let before = m.hypotheses().clone();
        let err = m.process(&abs(3.1, 3.0)).unwrap_err();
        assert!(matches!(
            err,
            FusionError::StaleSample {
                sensor: SensorSource::Abs,
                ..
            }
        ));
        assert_eq!(m.hypotheses(), &before);
        assert_eq!(m.filter_time(), Some(3.2));
        assert_eq!(m.state(), FusionState::Initializing);
    }

    #[test]
    fn rejected_fix_reseeds_while_initializing() {
        let mut m = machine();
        m.process(&gps(0.0, 0.0, 0.0, 5)).unwrap();
        let outcome = m.process(&gps(1.0, 1.0e5, -1.0e5, 5)).unwrap();
        assert_eq!(outcome.state, FusionState::Initializing);
        assert!(outcome.published.is_none());

        assert_eq!(m.hypotheses().len(), 1);
        let h = m.hypotheses().get(0).unwrap();
        assert_abs_diff_eq!(h.mean[0], 1.0e5);
        assert_abs_diff_eq!(h.mean[1], -1.0e5);
        assert_abs_diff_eq!(h.weight, 1.0);
        // Four times the fix variance, and the configured heading prior.
        assert_abs_diff_eq!(h.covariance[(0, 0)], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            h.covariance[(2, 2)],
            m.config().initial_heading_std.powi(2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn driving_enters_tracking_with_a_gaussian_sum() {
        let (m, t) = tracking_machine();
        assert_eq!(m.state(), FusionState::Tracking);
        assert_abs_diff_eq!(t, 0.5, epsilon = 1e-9);
        assert_eq!(m.hypotheses().len(), m.config().max_hypotheses);
        assert_abs_diff_eq!(m.hypotheses().total_weight(), 1.0, epsilon = 1e-12);

        let published = m.board().latest().unwrap();
        assert_eq!(published.state, FusionState::Tracking);
        assert!(published.x > 0.0);
    }

    #[test]
    fn stale_samples_are_rejected_without_side_effects() {
        let (mut m, t) = tracking_machine();
        let before = m.hypotheses().clone();
        let err = m.process(&abs(t - 0.05, 3.0)).unwrap_err();
        assert!(matches!(
            err,
            FusionError::StaleSample {
                sensor: SensorSource::Abs,
                ..
            }
        ));
        assert_eq!(m.hypotheses(), &before);
        assert_eq!(m.source_time(SensorSource::Abs), Some(t));

        // Older than the filter clock but new for its own source is fine.
        m.process(&gyro(t - 0.05, 0.0)).unwrap();
        assert_eq!(m.filter_time(), Some(t));
    }

    #[test]
    fn gps_cycle_publishes_and_raises_internal_query() {
        let (mut m, t) = tracking_machine();
        let outcome = m.process(&abs(t + 0.1, 3.0)).unwrap();
        assert!(outcome.published.as_ref().unwrap().matched.is_none());
        assert!(outcome.internal_query.is_none());

        let outcome = m.process(&gps(t + 0.2, 2.0, 0.0, 5)).unwrap();
        assert_eq!(outcome.internal_query, Some(EstimateRequest::InternalQuery));
        let estimate = outcome.published.unwrap();
        assert!(estimate.matched.is_none());
        assert_abs_diff_eq!(m.hypotheses().total_weight(), 1.0, epsilon = 1e-9);
        assert_eq!(m.board().latest(), Some(estimate));
    }

    #[test]
    fn roads_out_of_range_publish_without_segment() {
        use crate::mapping::{MapCache, Road};

        let far = Road::from_polyline(0, &[Point2::new(0.0, 900.0), Point2::new(100.0, 900.0)])
            .unwrap();
        let mut m = PositioningStateMachine::new(
            FusionConfig::default(),
            MatcherConfig::default(),
            SharedMapCache::new(MapCache::new(Point2::origin(), 500.0, vec![far])),
            EstimateBoard::new(),
        );
        m.process(&gps(0.0, 0.0, 0.0, 5)).unwrap();
        let mut t = 0.0;
        while !m.state().is_tracking() {
            t += 0.1;
            m.process(&abs(t, 3.0)).unwrap();
        }

        let outcome = m.process(&gps(t + 0.1, 1.5, 0.0, 5)).unwrap();
        assert_eq!(outcome.state, FusionState::Tracking);
        assert!(outcome.map_request.is_none());
        assert!(outcome.published.unwrap().matched.is_none());
    }

    #[test]
    fn low_integrity_fix_is_ignored_while_tracking() {
        let (mut m, t) = tracking_machine();
        let before = m.hypotheses().clone();
        let outcome = m.process(&gps(t + 0.1, 50.0, 50.0, 1)).unwrap();
        assert!(outcome.published.is_none());
        assert_eq!(m.hypotheses(), &before);
    }

    #[test]
    fn silent_gps_falls_back_to_cold_start() {
        let (mut m, _) = tracking_machine();
        m.process(&abs(5.0, 3.0)).unwrap();
        assert_eq!(m.state(), FusionState::Tracking);

        let outcome = m.process(&abs(5.5, 3.0)).unwrap();
        assert_eq!(outcome.state, FusionState::ColdStart);
        assert!(m.board().latest().is_none());
        assert!(m.hypotheses().is_empty());
    }

    #[test]
    fn rejected_fix_reseeds_at_the_fix() {
        let (mut m, t) = tracking_machine();
        let outcome = m.process(&gps(t + 0.1, 1.0e5, -1.0e5, 5)).unwrap();
        let estimate = outcome.published.unwrap();
        assert_eq!(m.hypotheses().len(), 1);
        assert_abs_diff_eq!(estimate.x, 1.0e5);
        assert_abs_diff_eq!(estimate.y, -1.0e5);
        assert_eq!(estimate.state, FusionState::Tracking);
    }

    #[test]
    fn reset_returns_to_cold_start() {
        let (mut m, _) = tracking_machine();
        m.reset();
        assert_eq!(m.state(), FusionState::ColdStart);
        assert!(m.filter_time().is_none());
        assert_eq!(m.board().state(), FusionState::ColdStart);
    }
}
