//! Fixed-interval control loop.
//!
//! One tick:
//!
//! 1. **Hardware** – both motor controllers must be available, otherwise the
//!    operation is aborted.
//! 2. **Localize** – grab a frame, find the particle, map it to physical
//!    coordinates. A tick without a located particle counts as a miss
//!    against the retry limit.
//! 3. **Evaluate** – let the [`NavigationController`] complete, advance,
//!    retry or abort.
//! 4. **Actuate** – update the stagnation boost, compute the coil command
//!    toward the current target and dispatch it.
//! 5. **Record** – localize again and append a [`DataLogRecord`].
//!
//! Ticks never overlap: the next one starts after the previous returned and
//! the interval elapsed.

use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;

use crate::actuation::{build_model, ActuationError, ActuationModel, StagnationBoost};
use crate::calibration::{BackgroundModel, CalibrationSnapshot};
use crate::coil::CoilSet;
use crate::config::ControllerConfig;
use crate::hardware::{Clock, DispatchError, HardwareDispatcher};
use crate::localize::{LocalizeError, ParticleLocalizer};
use crate::navigation::{
    ControllerEvents, NavigationController, NavigationError, NavigationState, TickDecision,
    RETRY_ABORT_MESSAGE,
};
use crate::path::{DeliveryPath, PathConfig};
use crate::telemetry::{DataLog, DataLogRecord};

pub const HARDWARE_ABORT_MESSAGE: &str =
    "Motor controllers are unavailable. Stopping particle delivery for safety.";

/// Supplier of camera frames.
pub trait FrameSource {
    /// Latest frame, or `None` if the camera has nothing to deliver.
    fn next_frame(&mut self) -> Option<GrayImage>;
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Localize(#[from] LocalizeError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Actuation(#[from] ActuationError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Time from the start of one tick to the start of the next.
    pub tick_interval_ms: u64,
}

impl OperationConfig {
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 800;

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

pub(crate) fn validate_operation_config(cfg: &OperationConfig) -> Result<(), String> {
    if cfg.tick_interval_ms == 0 {
        return Err("operation.tick_interval_ms must be >= 1".to_string());
    }
    Ok(())
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A command was dispatched.
    Actuated(DataLogRecord),
    /// No frame or no particle; counted as a miss, nothing was sent.
    Skipped,
    Completed,
    Aborted(String),
}

/// How a [`Operation::run`] loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Aborted(String),
    /// The tick budget ran out; the operation is paused and can resume.
    TickLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub ticks: u64,
    pub progress_percent: f64,
}

/// One particle delivery: owns the controller, models and hardware for its
/// duration.
pub struct Operation<E: ControllerEvents> {
    path_config: PathConfig,
    tick_interval: Duration,
    snapshot: CalibrationSnapshot,
    coil_locations: CoilSet<[f64; 2]>,
    controller: NavigationController,
    model: Box<dyn ActuationModel>,
    boost: StagnationBoost,
    dispatcher: HardwareDispatcher,
    localizer: ParticleLocalizer,
    clock: Arc<dyn Clock>,
    events: E,
    log: DataLog,
    command_counter: u64,
    started_at: Duration,
    finished: Option<(NavigationState, f64)>,
}

impl<E: ControllerEvents> Operation<E> {
    pub fn new(
        config: &ControllerConfig,
        snapshot: CalibrationSnapshot,
        background: &BackgroundModel,
        dispatcher: HardwareDispatcher,
        clock: Arc<dyn Clock>,
        events: E,
    ) -> Result<Self, OperationError> {
        let mut localizer = ParticleLocalizer::new(config.localize.clone(), &snapshot);
        localizer.set_background(background)?;
        let model = build_model(&config.actuation)?;
        Ok(Self {
            path_config: config.path.clone(),
            tick_interval: config.operation.tick_interval(),
            coil_locations: snapshot.coil_physical_locations(),
            snapshot,
            controller: NavigationController::new(config.navigation.clone()),
            model,
            boost: StagnationBoost::new(config.actuation.boost.clone()),
            dispatcher,
            localizer,
            clock,
            events,
            log: DataLog::new(),
            command_counter: 0,
            started_at: Duration::ZERO,
            finished: None,
        })
    }

    /// Set up traversal of `checkpoints`. Refused when either motor
    /// controller is unavailable.
    pub fn start(&mut self, checkpoints: &DeliveryPath) -> Result<(), OperationError> {
        if let Err(e) = self.dispatcher.check_available() {
            self.events.on_log_message(HARDWARE_ABORT_MESSAGE);
            return Err(e.into());
        }
        if self.finished.is_some() {
            self.finished = None;
            self.log.clear();
            self.command_counter = 0;
        }
        self.controller.setup(
            checkpoints,
            checkpoints.total_distance(),
            self.path_config.tolerance,
            self.path_config.interpolation_distance,
            &mut self.events,
        )?;
        self.boost.reset();
        self.started_at = self.clock.elapsed();
        self.events.on_log_message("Operation started");
        Ok(())
    }

    /// Run a single control tick.
    pub fn tick(&mut self, frames: &mut dyn FrameSource) -> Result<TickOutcome, OperationError> {
        let state = self.controller.state();
        if state != NavigationState::Traversing {
            return Err(NavigationError::NotTraversing(state).into());
        }
        if !self.dispatcher.is_available() {
            return Ok(self.abort(HARDWARE_ABORT_MESSAGE));
        }

        let Some(current) = self.locate(frames) else {
            tracing::debug!("particle not located, counting a miss");
            return match self.controller.register_lost_tick(&mut self.events)? {
                TickDecision::Aborted => {
                    self.finish();
                    Ok(TickOutcome::Aborted(RETRY_ABORT_MESSAGE.to_string()))
                }
                _ => Ok(TickOutcome::Skipped),
            };
        };

        match self.controller.evaluate_tick(current, &mut self.events)? {
            TickDecision::Completed => {
                self.finish();
                return Ok(TickOutcome::Completed);
            }
            TickDecision::Aborted => {
                self.finish();
                return Ok(TickOutcome::Aborted(RETRY_ABORT_MESSAGE.to_string()));
            }
            TickDecision::Proceed => {}
        }

        let Some(target) = self.controller.target().map(|p| p.physical) else {
            return Err(NavigationError::NotTraversing(self.controller.state()).into());
        };
        self.boost.update(current, target);
        let command = self
            .model
            .compute(current, target, &self.coil_locations, &self.boost);

        self.command_counter += 1;
        if let Err(e) = self.dispatcher.dispatch(&command, self.clock.as_ref()) {
            let reason = format!(
                "Hardware command failed ({}). Stopping particle delivery for safety.",
                e
            );
            return Ok(self.abort(&reason));
        }

        let final_pos = self.locate(frames).unwrap_or(current);
        let t = self.clock.elapsed().saturating_sub(self.started_at).as_secs_f64();
        let record = self
            .log
            .record(t, current, final_pos, &command, self.command_counter, target)
            .clone();
        Ok(TickOutcome::Actuated(record))
    }

    /// Tick at the configured interval until the operation ends or
    /// `max_ticks` ticks have run.
    pub fn run(
        &mut self,
        frames: &mut dyn FrameSource,
        max_ticks: Option<u64>,
    ) -> Result<RunSummary, OperationError> {
        let mut ticks = 0;
        loop {
            if max_ticks.is_some_and(|max| ticks >= max) {
                tracing::warn!("tick limit {} reached, pausing", ticks);
                self.pause();
                return Ok(self.summary(RunOutcome::TickLimit, ticks));
            }
            let tick_start = self.clock.elapsed();
            let outcome = self.tick(frames)?;
            ticks += 1;
            match outcome {
                TickOutcome::Completed => return Ok(self.summary(RunOutcome::Completed, ticks)),
                TickOutcome::Aborted(reason) => {
                    return Ok(self.summary(RunOutcome::Aborted(reason), ticks))
                }
                TickOutcome::Actuated(_) | TickOutcome::Skipped => {
                    self.clock.sleep_until(tick_start + self.tick_interval);
                }
            }
        }
    }

    /// Suspend traversal; a later [`start`](Self::start) resumes from the
    /// current checkpoint.
    pub fn pause(&mut self) {
        self.controller.pause();
        self.boost.reset();
        self.events.on_log_message("Paused Operation");
    }

    /// User stop: end the operation and clear all traversal state.
    pub fn stop(&mut self) {
        if self.controller.state() == NavigationState::Traversing {
            self.events.on_log_message("Operation stopped");
        }
        self.controller.reset();
        self.boost.reset();
        self.finished = None;
    }

    /// Physical particle position; a missing frame or a failed
    /// localization is a miss.
    fn locate(&mut self, frames: &mut dyn FrameSource) -> Option<[f64; 2]> {
        let Some(frame) = frames.next_frame() else {
            tracing::warn!("no camera frame available");
            return None;
        };
        match self.localizer.locate(&frame) {
            Ok(px) => px.map(|p| self.snapshot.map_to_physical(p)),
            Err(e) => {
                tracing::warn!("localization failed: {}", e);
                None
            }
        }
    }

    fn abort(&mut self, reason: &str) -> TickOutcome {
        self.controller.abort(reason, &mut self.events);
        self.finish();
        TickOutcome::Aborted(reason.to_string())
    }

    /// Record the terminal state, then clear traversal state.
    fn finish(&mut self) {
        self.finished = Some((self.controller.state(), self.controller.progress_percent()));
        self.controller.reset();
        self.boost.reset();
    }

    fn summary(&self, outcome: RunOutcome, ticks: u64) -> RunSummary {
        RunSummary {
            outcome,
            ticks,
            progress_percent: self.progress_percent(),
        }
    }

    /// Navigation state; after the operation ended, the state it ended in.
    pub fn state(&self) -> NavigationState {
        match self.finished {
            Some((state, _)) => state,
            None => self.controller.state(),
        }
    }

    pub fn progress_percent(&self) -> f64 {
        match self.finished {
            Some((_, progress)) => progress,
            None => self.controller.progress_percent(),
        }
    }

    pub fn controller(&self) -> &NavigationController {
        &self.controller
    }

    pub fn data_log(&self) -> &DataLog {
        &self.log
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    pub fn command_counter(&self) -> u64 {
        self.command_counter
    }

    pub fn snapshot(&self) -> &CalibrationSnapshot {
        &self.snapshot
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }
}
