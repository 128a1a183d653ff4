//! Motor-controller dispatch.
//!
//! Each axis has its own two-output motor controller: output `M1` drives the
//! plus coil and `M2` the minus coil. A pulse is `forward(output, scale)`,
//! a blocking wait for the pulse duration, then an explicit
//! `forward(output, 0)`. The X and Y pulses run on two scoped threads so
//! their durations overlap; the dispatch returns once both are joined.

mod clock;
mod recording;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use recording::{MotorCall, RecordingMotor};

use std::time::Duration;

use crate::actuation::{ActuationCommand, CoilCommand};
use crate::coil::Axis;

/// Output of a two-channel motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MotorOutput {
    /// Plus coil of the axis.
    M1,
    /// Minus coil of the axis.
    M2,
}

/// Handle to one axis motor controller.
pub trait MotorChannel: Send {
    fn is_available(&self) -> bool;

    /// Drive `output` at `scale` (0 stops it). Returns whether the controller
    /// acknowledged the command.
    fn forward(&mut self, output: MotorOutput, scale: u8) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("{0:?} motor controller is unavailable")]
    Unavailable(Axis),
    #[error("motor command failed (x ok: {x_ok}, y ok: {y_ok})")]
    CommandFailed { x_ok: bool, y_ok: bool },
}

/// Executes coil commands on the X and Y motor controllers.
pub struct HardwareDispatcher {
    x: Box<dyn MotorChannel>,
    y: Box<dyn MotorChannel>,
}

impl HardwareDispatcher {
    pub fn new(x: Box<dyn MotorChannel>, y: Box<dyn MotorChannel>) -> Self {
        Self { x, y }
    }

    /// Both controllers report themselves available.
    pub fn is_available(&self) -> bool {
        self.x.is_available() && self.y.is_available()
    }

    /// First unavailable controller, X before Y.
    pub fn check_available(&self) -> Result<(), DispatchError> {
        if !self.x.is_available() {
            return Err(DispatchError::Unavailable(Axis::X));
        }
        if !self.y.is_available() {
            return Err(DispatchError::Unavailable(Axis::Y));
        }
        Ok(())
    }

    /// Run `command` on both axes concurrently and wait for both.
    ///
    /// Nothing is sent when either controller is unavailable.
    pub fn dispatch(&mut self, command: &ActuationCommand, clock: &dyn Clock) -> Result<(), DispatchError> {
        self.check_available()?;

        let start = clock.elapsed();
        let x_pulse = command.axis(Axis::X);
        let y_pulse = command.axis(Axis::Y);
        let x = &mut self.x;
        let y = &mut self.y;
        let (x_ok, y_ok) = std::thread::scope(|s| {
            let hx = s.spawn(move || drive_axis(x.as_mut(), x_pulse, start, clock));
            let hy = s.spawn(move || drive_axis(y.as_mut(), y_pulse, start, clock));
            (hx.join().unwrap_or(false), hy.join().unwrap_or(false))
        });

        if x_ok && y_ok {
            Ok(())
        } else {
            tracing::warn!("dispatch failed: x ok {}, y ok {}", x_ok, y_ok);
            Err(DispatchError::CommandFailed { x_ok, y_ok })
        }
    }
}

impl std::fmt::Debug for HardwareDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareDispatcher")
            .field("x_available", &self.x.is_available())
            .field("y_available", &self.y.is_available())
            .finish()
    }
}

/// Pulse the active coil of one axis. An axis with no active coil sends
/// nothing and succeeds.
fn drive_axis(
    channel: &mut dyn MotorChannel,
    (plus, minus): (CoilCommand, CoilCommand),
    start: Duration,
    clock: &dyn Clock,
) -> bool {
    let (output, pulse) = if plus.is_active() {
        (MotorOutput::M1, plus)
    } else if minus.is_active() {
        (MotorOutput::M2, minus)
    } else {
        return true;
    };
    let started = channel.forward(output, pulse.scale);
    clock.sleep_until(start + Duration::from_millis(pulse.duration_ms as u64));
    let stopped = channel.forward(output, 0);
    started && stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coil::Coil;

    fn rig() -> (HardwareDispatcher, RecordingMotor, RecordingMotor) {
        let x = RecordingMotor::new();
        let y = RecordingMotor::new();
        let d = HardwareDispatcher::new(Box::new(x.clone()), Box::new(y.clone()));
        (d, x, y)
    }

    #[test]
    fn pulses_active_coils_and_stops_them() {
        let (mut d, x, y) = rig();
        let clock = SimulatedClock::new();
        let mut cmd = ActuationCommand::single(Coil::MinusX, 40, 100);
        cmd.coils[Coil::PlusY] = CoilCommand {
            scale: 12,
            duration_ms: 100,
        };
        d.dispatch(&cmd, &clock).unwrap();

        let xs: Vec<(MotorOutput, u8)> = x.calls().iter().map(|c| (c.output, c.scale)).collect();
        let ys: Vec<(MotorOutput, u8)> = y.calls().iter().map(|c| (c.output, c.scale)).collect();
        assert_eq!(xs, vec![(MotorOutput::M2, 40), (MotorOutput::M2, 0)]);
        assert_eq!(ys, vec![(MotorOutput::M1, 12), (MotorOutput::M1, 0)]);
        // axis pulses overlap
        assert_eq!(clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn idle_axis_sends_nothing() {
        let (mut d, x, y) = rig();
        let clock = SimulatedClock::new();
        d.dispatch(&ActuationCommand::single(Coil::PlusX, 9, 100), &clock)
            .unwrap();
        assert_eq!(x.calls().len(), 2);
        assert!(y.calls().is_empty());
    }

    #[test]
    fn unavailable_controller_fails_fast() {
        let (mut d, x, y) = rig();
        y.set_available(false);
        let err = d
            .dispatch(&ActuationCommand::single(Coil::PlusX, 9, 100), &SimulatedClock::new())
            .unwrap_err();
        assert_eq!(err, DispatchError::Unavailable(Axis::Y));
        assert!(x.calls().is_empty());
        assert!(!d.is_available());
    }

    #[test]
    fn failed_stop_fails_the_axis() {
        let (mut d, x, _y) = rig();
        x.fail_after(1);
        let err = d
            .dispatch(&ActuationCommand::single(Coil::PlusX, 9, 100), &SimulatedClock::new())
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::CommandFailed {
                x_ok: false,
                y_ok: true
            }
        );
        // the stop was still attempted
        assert_eq!(x.calls().len(), 2);
    }

    #[test]
    fn real_clock_blocks_for_duration() {
        let (mut d, _x, _y) = rig();
        let clock = SystemClock::new();
        let t0 = clock.elapsed();
        d.dispatch(&ActuationCommand::single(Coil::MinusY, 9, 30), &clock)
            .unwrap();
        assert!(clock.elapsed() - t0 >= Duration::from_millis(30));
    }
}
