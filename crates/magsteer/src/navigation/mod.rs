//! Path traversal state machine.
//!
//! `Idle → Traversing → {Completed | Aborted}`. Every control tick the
//! particle's physical position is compared with the current target point:
//!
//! 1. **Complete** – final point within tolerance.
//! 2. **Advance** – any other point within tolerance: move to the next
//!    point, report a passed checkpoint, and shorten the remaining distance.
//! 3. **Retry** – otherwise count a failed attempt; too many in a row abort
//!    the operation regardless of how close the particle is.

mod events;

pub use events::{ControllerEvents, EventLog, NoopEvents};

use crate::geometry::distance;
use crate::path::{validate_path_params, DeliveryPath, PathError, PathPoint};

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("invalid path setup: {0}")]
    Path(#[from] PathError),
    #[error("cannot set up while {0:?}")]
    Busy(NavigationState),
    #[error("controller is {0:?}, not traversing")]
    NotTraversing(NavigationState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationState {
    Idle,
    Traversing,
    Completed,
    Aborted,
}

/// Outcome of one tick evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Keep going: actuate toward the current target.
    Proceed,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Consecutive failed evaluations that abort the operation.
    pub retry_limit: u32,
}

impl NavigationConfig {
    pub const DEFAULT_RETRY_LIMIT: u32 = 40;
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            retry_limit: Self::DEFAULT_RETRY_LIMIT,
        }
    }
}

pub(crate) fn validate_navigation_config(cfg: &NavigationConfig) -> Result<(), String> {
    if cfg.retry_limit == 0 {
        return Err("navigation.retry_limit must be >= 1".to_string());
    }
    Ok(())
}

pub const RETRY_ABORT_MESSAGE: &str =
    "Translations have been repeatedly unsuccessful. Stopping particle delivery for safety.";
pub const COMPLETE_MESSAGE: &str = "Operation complete!";

#[derive(Debug, Clone)]
pub struct NavigationController {
    config: NavigationConfig,
    state: NavigationState,
    path: DeliveryPath,
    target_index: usize,
    current_checkpoint: usize,
    retry_count: u32,
    tolerance: f64,
    interpolation_distance: f64,
    total_distance: f64,
    remaining_distance: f64,
    actual_deviation: f64,
}

impl NavigationController {
    pub fn new(config: NavigationConfig) -> Self {
        Self {
            config,
            state: NavigationState::Idle,
            path: DeliveryPath::default(),
            target_index: 0,
            current_checkpoint: 0,
            retry_count: 0,
            tolerance: 0.0,
            interpolation_distance: 0.0,
            total_distance: 0.0,
            remaining_distance: 0.0,
            actual_deviation: 0.0,
        }
    }

    /// Prepare a traversal of `checkpoints`, starting from the current
    /// checkpoint index so a paused operation resumes where it stopped.
    ///
    /// The remaining distance is only initialised from `total_distance` when
    /// it is zero.
    pub fn setup(
        &mut self,
        checkpoints: &DeliveryPath,
        total_distance: f64,
        tolerance: f64,
        interpolation_distance: f64,
        events: &mut dyn ControllerEvents,
    ) -> Result<(), NavigationError> {
        if self.state != NavigationState::Idle {
            return Err(NavigationError::Busy(self.state));
        }
        let mut path = checkpoints.from_checkpoint(self.current_checkpoint);
        if let Err(e) = validate_path_params(path.len(), tolerance, interpolation_distance)
            .and_then(|_| path.discretize(interpolation_distance).map(|_| ()))
        {
            let msg = format!("Cannot set up path for traversal: {}", e);
            tracing::warn!("{}", msg);
            events.on_log_message(&msg);
            return Err(e.into());
        }

        self.path = path;
        self.target_index = 0;
        self.tolerance = tolerance;
        self.interpolation_distance = interpolation_distance;
        self.total_distance = total_distance;
        if self.remaining_distance == 0.0 {
            self.remaining_distance = total_distance;
        }
        self.retry_count = 0;
        self.actual_deviation = 0.0;
        self.state = NavigationState::Traversing;
        tracing::info!(
            "traversal ready: {} points from checkpoint {}, tolerance {}, remaining {:.3}",
            self.path.len(),
            self.current_checkpoint,
            tolerance,
            self.remaining_distance
        );
        Ok(())
    }

    /// Compare the particle position with the target and update the state.
    pub fn evaluate_tick(
        &mut self,
        particle: [f64; 2],
        events: &mut dyn ControllerEvents,
    ) -> Result<TickDecision, NavigationError> {
        if self.state != NavigationState::Traversing {
            return Err(NavigationError::NotTraversing(self.state));
        }
        let Some(target) = self.path.get(self.target_index).copied() else {
            return Err(NavigationError::NotTraversing(self.state));
        };

        self.actual_deviation = distance(particle, target.physical);
        let within = self.actual_deviation <= self.tolerance;
        let is_final = self.target_index + 1 >= self.path.len();

        if is_final && within {
            self.state = NavigationState::Completed;
            tracing::info!("operation complete at {:?}", target.physical);
            events.on_operation_complete();
            events.on_log_message(COMPLETE_MESSAGE);
            return Ok(TickDecision::Completed);
        } else if within {
            if target.is_checkpoint {
                tracing::info!("checkpoint {} passed", self.current_checkpoint);
                events.on_checkpoint_passed(self.current_checkpoint);
                self.current_checkpoint += 1;
            }
            self.target_index += 1;
            if let Some(next) = self.path.get(self.target_index) {
                let step = distance(next.physical, target.physical);
                self.remaining_distance = (self.remaining_distance - step).max(0.0);
            }
            self.retry_count = 0;
        } else {
            self.retry_count += 1;
        }
        Ok(self.check_retry_limit(events))
    }

    /// Count a tick on which the particle could not be observed as a miss.
    pub fn register_lost_tick(
        &mut self,
        events: &mut dyn ControllerEvents,
    ) -> Result<TickDecision, NavigationError> {
        if self.state != NavigationState::Traversing {
            return Err(NavigationError::NotTraversing(self.state));
        }
        self.retry_count += 1;
        Ok(self.check_retry_limit(events))
    }

    fn check_retry_limit(&mut self, events: &mut dyn ControllerEvents) -> TickDecision {
        if self.retry_count >= self.config.retry_limit {
            self.state = NavigationState::Aborted;
            tracing::warn!(
                "{} consecutive misses (deviation {:.3}); aborting",
                self.retry_count,
                self.actual_deviation
            );
            events.on_abort(RETRY_ABORT_MESSAGE);
            events.on_log_message(RETRY_ABORT_MESSAGE);
            return TickDecision::Aborted;
        }
        TickDecision::Proceed
    }

    /// Stop for an external reason (hardware loss, dispatch failure).
    pub fn abort(&mut self, reason: &str, events: &mut dyn ControllerEvents) {
        if matches!(self.state, NavigationState::Completed | NavigationState::Aborted) {
            return;
        }
        self.state = NavigationState::Aborted;
        tracing::warn!("operation aborted: {}", reason);
        events.on_abort(reason);
        events.on_log_message(reason);
    }

    /// Leave `Traversing` but keep the checkpoint index and remaining
    /// distance so a later [`setup`](Self::setup) resumes.
    pub fn pause(&mut self) {
        if self.state != NavigationState::Traversing {
            return;
        }
        self.path.clear();
        self.target_index = 0;
        self.retry_count = 0;
        self.state = NavigationState::Idle;
        tracing::info!("paused at checkpoint {}", self.current_checkpoint);
    }

    /// Clear the path and every counter.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// `100 × (1 − remaining / total)`.
    pub fn progress_percent(&self) -> f64 {
        if self.total_distance <= 0.0 {
            return if self.state == NavigationState::Completed { 100.0 } else { 0.0 };
        }
        100.0 * (1.0 - self.remaining_distance / self.total_distance)
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn target(&self) -> Option<&PathPoint> {
        self.path.get(self.target_index)
    }

    pub fn target_index(&self) -> usize {
        self.target_index
    }

    pub fn path(&self) -> &DeliveryPath {
        &self.path
    }

    pub fn current_checkpoint(&self) -> usize {
        self.current_checkpoint
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn interpolation_distance(&self) -> f64 {
        self.interpolation_distance
    }

    pub fn actual_deviation(&self) -> f64 {
        self.actual_deviation
    }

    pub fn remaining_distance(&self) -> f64 {
        self.remaining_distance
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new(NavigationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::physical_checkpoint;
    use approx::assert_abs_diff_eq;

    fn checkpoints(points: &[[f64; 2]]) -> DeliveryPath {
        DeliveryPath::new(points.iter().map(|&p| physical_checkpoint(p)).collect())
    }

    fn ready(points: &[[f64; 2]], tol: f64, interp: f64) -> (NavigationController, EventLog) {
        let cps = checkpoints(points);
        let mut nav = NavigationController::default();
        let mut log = EventLog::default();
        nav.setup(&cps, cps.total_distance(), tol, interp, &mut log).unwrap();
        (nav, log)
    }

    #[test]
    fn straight_line_completes_with_full_progress() {
        let (mut nav, mut log) = ready(&[[0.0, 0.0], [10.0, 0.0]], 0.5, 2.0);
        assert_eq!(nav.state(), NavigationState::Traversing);
        assert_eq!(nav.path().len(), 9);

        let mut ticks = 0;
        loop {
            let target = nav.target().unwrap().physical;
            let noisy = [target[0] + 0.2, target[1] - 0.1];
            ticks += 1;
            match nav.evaluate_tick(noisy, &mut log).unwrap() {
                TickDecision::Proceed => assert_eq!(nav.retry_count(), 0),
                TickDecision::Completed => break,
                TickDecision::Aborted => panic!("unexpected abort"),
            }
        }
        assert_eq!(ticks, 9);
        assert_eq!(nav.state(), NavigationState::Completed);
        assert_eq!(log.checkpoints, vec![0]);
        assert_eq!(log.completions, 1);
        assert_abs_diff_eq!(nav.progress_percent(), 100.0, epsilon = 1e-9);
        assert_eq!(nav.target().unwrap().physical, [10.0, 0.0]);
        assert!(matches!(
            nav.evaluate_tick([10.0, 0.0], &mut log),
            Err(NavigationError::NotTraversing(NavigationState::Completed))
        ));
    }

    #[test]
    fn aborts_exactly_on_fortieth_miss() {
        let (mut nav, mut log) = ready(&[[0.0, 0.0], [4.0, 0.0]], 0.5, 2.0);
        for i in 1..40 {
            assert_eq!(nav.evaluate_tick([0.6, 0.0], &mut log).unwrap(), TickDecision::Proceed);
            assert_eq!(nav.retry_count(), i);
        }
        assert_eq!(nav.evaluate_tick([0.6, 0.0], &mut log).unwrap(), TickDecision::Aborted);
        assert_eq!(nav.state(), NavigationState::Aborted);
        assert_eq!(log.aborts, vec![RETRY_ABORT_MESSAGE.to_string()]);
    }

    #[test]
    fn success_resets_retry_count() {
        let (mut nav, mut log) = ready(&[[0.0, 0.0], [4.0, 0.0]], 0.5, 2.0);
        for _ in 0..39 {
            nav.evaluate_tick([3.0, 3.0], &mut log).unwrap();
        }
        assert_eq!(nav.retry_count(), 39);
        // reach (0,0)
        assert_eq!(nav.evaluate_tick([0.1, 0.0], &mut log).unwrap(), TickDecision::Proceed);
        assert_eq!(nav.retry_count(), 0);
        for _ in 0..39 {
            assert_eq!(nav.evaluate_tick([3.0, 3.0], &mut log).unwrap(), TickDecision::Proceed);
        }
        assert_eq!(nav.evaluate_tick([3.0, 3.0], &mut log).unwrap(), TickDecision::Aborted);
    }

    #[test]
    fn lost_ticks_share_the_retry_budget() {
        let (mut nav, mut log) = ready(&[[0.0, 0.0], [4.0, 0.0]], 0.5, 2.0);
        for _ in 0..20 {
            nav.evaluate_tick([3.0, 3.0], &mut log).unwrap();
        }
        for _ in 0..19 {
            assert_eq!(nav.register_lost_tick(&mut log).unwrap(), TickDecision::Proceed);
        }
        assert_eq!(nav.retry_count(), 39);
        assert_eq!(nav.register_lost_tick(&mut log).unwrap(), TickDecision::Aborted);
        assert_eq!(nav.state(), NavigationState::Aborted);
        assert_eq!(log.aborts, vec![RETRY_ABORT_MESSAGE.to_string()]);
        assert!(nav.register_lost_tick(&mut log).is_err());
    }

    #[test]
    fn interpolated_points_emit_no_checkpoint_event() {
        let (mut nav, mut log) = ready(&[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0]], 0.1, 1.0);
        // points: (0,0)c (1,0) (2,0)c (2,1) (2,2)c
        nav.evaluate_tick([0.0, 0.0], &mut log).unwrap();
        assert_eq!(log.checkpoints, vec![0]);
        nav.evaluate_tick([1.0, 0.0], &mut log).unwrap();
        assert_eq!(log.checkpoints, vec![0]);
        nav.evaluate_tick([2.0, 0.0], &mut log).unwrap();
        assert_eq!(log.checkpoints, vec![0, 1]);
        assert_eq!(nav.current_checkpoint(), 2);
        assert_abs_diff_eq!(nav.remaining_distance(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(nav.progress_percent(), 75.0, epsilon = 1e-9);
    }

    #[test]
    fn invalid_setup_is_rejected_and_reported() {
        let mut nav = NavigationController::default();
        let mut log = EventLog::default();
        let cps = checkpoints(&[[0.0, 0.0]]);
        let err = nav.setup(&cps, 0.0, 0.0, 1.0, &mut log).unwrap_err();
        assert!(matches!(err, NavigationError::Path(PathError::NonPositiveTolerance(_))));
        let err = nav.setup(&DeliveryPath::default(), 0.0, 1.0, 1.0, &mut log).unwrap_err();
        assert!(matches!(err, NavigationError::Path(PathError::Empty)));
        assert_eq!(nav.state(), NavigationState::Idle);
        assert_eq!(log.messages.len(), 2);
    }

    #[test]
    fn pause_resumes_from_current_checkpoint() {
        let cps = checkpoints(&[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0]]);
        let mut nav = NavigationController::default();
        let mut log = EventLog::default();
        nav.setup(&cps, cps.total_distance(), 0.1, 5.0, &mut log).unwrap();
        nav.evaluate_tick([0.0, 0.0], &mut log).unwrap();
        nav.pause();
        assert_eq!(nav.state(), NavigationState::Idle);
        assert_eq!(nav.current_checkpoint(), 1);
        let remaining = nav.remaining_distance();
        assert_abs_diff_eq!(remaining, 2.0, epsilon = 1e-12);

        nav.setup(&cps, cps.total_distance(), 0.1, 5.0, &mut log).unwrap();
        assert_eq!(nav.target().unwrap().physical, [2.0, 0.0]);
        assert_eq!(nav.remaining_distance(), remaining);
        nav.evaluate_tick([2.0, 0.0], &mut log).unwrap();
        assert_eq!(log.checkpoints, vec![0, 1]);
    }

    #[test]
    fn reset_clears_everything() {
        let (mut nav, mut log) = ready(&[[0.0, 0.0], [2.0, 0.0]], 0.1, 1.0);
        nav.evaluate_tick([0.0, 0.0], &mut log).unwrap();
        nav.abort("motor controllers unavailable", &mut log);
        assert_eq!(nav.state(), NavigationState::Aborted);
        nav.reset();
        assert_eq!(nav.state(), NavigationState::Idle);
        assert!(nav.path().is_empty());
        assert_eq!(nav.current_checkpoint(), 0);
        assert_eq!(nav.remaining_distance(), 0.0);
        assert_eq!(nav.progress_percent(), 0.0);
        assert!(nav.target().is_none());
    }
}
