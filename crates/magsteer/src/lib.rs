//! magsteer: closed-loop navigation of a magnetic micro-particle.
//!
//! A camera watches a planar workspace bounded by four electromagnetic
//! coils. The controller runs these stages:
//!
//! 1. **Calibrate** – detect the coil fiducials and derive a pixel↔physical
//!    coordinate frame; build a particle-free background while jogging.
//! 2. **Plan** – take user checkpoints and densify them into a
//!    [`DeliveryPath`] by midpoint insertion.
//! 3. **Localize** – find the particle by background subtraction.
//! 4. **Navigate** – a state machine that completes, advances, retries or
//!    aborts once per control tick.
//! 5. **Actuate** – a per-coil model (neural network or fitted surface)
//!    turns the position error into coil scales, boosted when the particle
//!    stalls.
//! 6. **Dispatch** – pulse the X and Y motor controllers concurrently.
//!
//! [`Operation`] wires these together into the fixed-interval control loop.
//! [`sim::SimRig`] stands in for camera and coils when no rig is attached.

pub mod actuation;
pub mod calibration;
pub mod coil;
pub mod config;
pub mod fiducial;
pub mod geometry;
pub mod hardware;
pub mod localize;
pub mod navigation;
pub mod operation;
pub mod path;
pub mod sim;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_utils;

pub use actuation::{
    build_model, ActuationCommand, ActuationConfig, ActuationModel, CoilCommand, ModelKind,
    StagnationBoost,
};
pub use calibration::{
    BackgroundModel, CalibrationConfig, CalibrationError, CalibrationJog, CalibrationSnapshot,
    CoordinateCalibrator,
};
pub use coil::{Axis, Coil, CoilSet};
pub use config::{ConfigError, ControllerConfig};
pub use fiducial::{DetectedMarker, MarkerDetector, MarkerDictionary};
pub use hardware::{Clock, HardwareDispatcher, MotorChannel, MotorOutput, SystemClock};
pub use localize::{LocalizeConfig, LocalizeError, ParticleLocalizer};
pub use navigation::{
    ControllerEvents, NavigationController, NavigationError, NavigationState, TickDecision,
};
pub use operation::{FrameSource, Operation, OperationConfig, OperationError, RunOutcome, TickOutcome};
pub use path::{DeliveryPath, PathConfig, PathError, PathPoint};
pub use telemetry::{DataLog, DataLogRecord};
