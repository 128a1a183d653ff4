//! Particle jog pattern used while the background model is built.
//!
//! The particle is pulled around a diamond (+Y, +X, −Y, −X) so that averaging
//! frames washes it out of the reference image. The pattern starts with one
//! stronger −X pulse to park the particle at the first corner; a background
//! frame is sampled after every diamond move but not after that pulse.

use crate::actuation::ActuationCommand;
use crate::coil::Coil;

const DIAMOND: [Coil; 4] = [Coil::PlusY, Coil::PlusX, Coil::MinusY, Coil::MinusX];

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct JogConfig {
    pub initial_scale: u8,
    pub initial_duration_ms: u32,
    pub cycle_scale: u8,
    pub cycle_duration_ms: u32,
}

impl JogConfig {
    pub const DEFAULT_INITIAL_SCALE: u8 = 127;
    pub const DEFAULT_INITIAL_DURATION_MS: u32 = 300;
    pub const DEFAULT_CYCLE_SCALE: u8 = 100;
    pub const DEFAULT_CYCLE_DURATION_MS: u32 = 250;
}

impl Default for JogConfig {
    fn default() -> Self {
        Self {
            initial_scale: Self::DEFAULT_INITIAL_SCALE,
            initial_duration_ms: Self::DEFAULT_INITIAL_DURATION_MS,
            cycle_scale: Self::DEFAULT_CYCLE_SCALE,
            cycle_duration_ms: Self::DEFAULT_CYCLE_DURATION_MS,
        }
    }
}

/// One jog pulse and whether a background frame should follow it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JogStep {
    pub command: ActuationCommand,
    pub sample_background: bool,
}

/// Endless jog sequence. `None` position means the parking pulse is next.
#[derive(Debug, Clone)]
pub struct CalibrationJog {
    config: JogConfig,
    next: Option<usize>,
}

impl CalibrationJog {
    pub fn new(config: JogConfig) -> Self {
        Self { config, next: None }
    }

    /// Restart from the parking pulse.
    pub fn reset(&mut self) {
        self.next = None;
    }
}

impl Iterator for CalibrationJog {
    type Item = JogStep;

    fn next(&mut self) -> Option<JogStep> {
        let step = match self.next {
            None => {
                self.next = Some(0);
                JogStep {
                    command: ActuationCommand::single(
                        Coil::MinusX,
                        self.config.initial_scale,
                        self.config.initial_duration_ms,
                    ),
                    sample_background: false,
                }
            }
            Some(i) => {
                self.next = Some((i + 1) % DIAMOND.len());
                JogStep {
                    command: ActuationCommand::single(
                        DIAMOND[i],
                        self.config.cycle_scale,
                        self.config.cycle_duration_ms,
                    ),
                    sample_background: true,
                }
            }
        };
        Some(step)
    }
}
