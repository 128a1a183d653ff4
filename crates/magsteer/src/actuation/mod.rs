//! Inverse actuation: desired displacement → per-coil hardware command.
//!
//! Each axis is handled independently:
//!
//! 1. **Select** – the sign of the required travel picks the plus or minus
//!    coil; zero travel leaves both coils of the axis off.
//! 2. **Estimate** – the model maps `(current, target, distance to coil)` to a
//!    raw current scale ([`ActuationModel::raw_scale`]).
//! 3. **Clamp** – the estimate is truncated and raised to the minimum
//!    effective scale.
//! 4. **Boost** – the [`StagnationBoost`] for the coil's direction is added;
//!    the sum saturates at 255.
//!
//! Two interchangeable models are provided: a per-coil feed-forward network
//! ([`NeuralActuationModel`]) and a cubic surface fit ([`SurfaceFitModel`]).

mod boost;
mod command;
mod neural;
mod surface;

pub use boost::{BoostConfig, StagnationBoost};
pub use command::{ActuationCommand, CoilCommand};
pub use neural::{CoilNetwork, NeuralActuationModel, ACTUATION_SCHEMA_V1, FEATURES, HIDDEN_UNITS};
pub use surface::SurfaceFitModel;

use std::path::PathBuf;

use crate::coil::{Axis, Coil, CoilSet};
use crate::geometry::distance;

pub(crate) use boost::validate_boost_config;

#[derive(Debug, thiserror::Error)]
pub enum ActuationError {
    #[error("failed to read actuation weights: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse actuation weights: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported actuation weights schema '{got}' (expected '{expected}')")]
    Schema { expected: &'static str, got: String },
    #[error("invalid actuation weights for {coil}: {reason}")]
    InvalidWeights { coil: Coil, reason: String },
}

/// Which actuation model drives the coils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Neural,
    SurfaceFit,
}

/// Output shaping shared by every model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    /// Smallest scale a fired coil receives.
    pub min_scale: u8,
    /// Activation time of every fired coil.
    pub duration_ms: u32,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            min_scale: ActuationConfig::DEFAULT_MIN_SCALE,
            duration_ms: ActuationConfig::DEFAULT_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    pub model: ModelKind,
    pub min_scale: u8,
    pub duration_ms: u32,
    /// Network weights file; the embedded weights are used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_path: Option<PathBuf>,
    #[serde(default)]
    pub boost: BoostConfig,
}

impl ActuationConfig {
    pub const DEFAULT_MIN_SCALE: u8 = 7;
    pub const DEFAULT_DURATION_MS: u32 = 100;

    pub fn limits(&self) -> CommandLimits {
        CommandLimits {
            min_scale: self.min_scale,
            duration_ms: self.duration_ms,
        }
    }
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            min_scale: Self::DEFAULT_MIN_SCALE,
            duration_ms: Self::DEFAULT_DURATION_MS,
            weights_path: None,
            boost: BoostConfig::default(),
        }
    }
}

pub(crate) fn validate_actuation_config(cfg: &ActuationConfig) -> Result<(), String> {
    if cfg.min_scale == 0 {
        return Err("actuation.min_scale must be >= 1".to_string());
    }
    if cfg.duration_ms == 0 {
        return Err("actuation.duration_ms must be >= 1".to_string());
    }
    validate_boost_config(&cfg.boost)
}

/// Inputs of one coil's scale estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoilQuery {
    pub coil: Coil,
    pub current: [f64; 2],
    pub target: [f64; 2],
    /// Absolute travel along the coil's axis.
    pub travel: f64,
    /// Physical distance from `current` to the coil.
    pub distance_to_coil: f64,
}

/// Maps a desired displacement to a coil command.
pub trait ActuationModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn limits(&self) -> CommandLimits;

    /// Unclamped current-scale estimate for the queried coil.
    fn raw_scale(&self, query: &CoilQuery) -> f64;

    /// Command moving the particle from `current` toward `target`.
    fn compute(
        &self,
        current: [f64; 2],
        target: [f64; 2],
        coil_locations: &CoilSet<[f64; 2]>,
        boost: &StagnationBoost,
    ) -> ActuationCommand {
        let limits = self.limits();
        let mut cmd = ActuationCommand::idle();
        for axis in Axis::ALL {
            let travel = axis.component(target) - axis.component(current);
            let Some(coil) = Coil::for_travel(axis, travel) else {
                continue;
            };
            let query = CoilQuery {
                coil,
                current,
                target,
                travel: travel.abs(),
                distance_to_coil: distance(current, coil_locations[coil]),
            };
            let raw = self.raw_scale(&query);
            cmd.coils[coil] = CoilCommand {
                scale: shape_scale(raw, limits.min_scale, boost.bonus_for(coil)),
                duration_ms: limits.duration_ms,
            };
        }
        cmd
    }
}

/// Truncate, clamp to `min_scale`, add `bonus`, saturate at 255.
fn shape_scale(raw: f64, min_scale: u8, bonus: u32) -> u8 {
    let min = min_scale.max(1) as f64;
    let base = if raw.is_finite() { raw.trunc().max(min) } else { min };
    let total = base.min(255.0) as u32 + bonus;
    total.min(255) as u8
}

/// Construct the model selected by `config`.
pub fn build_model(config: &ActuationConfig) -> Result<Box<dyn ActuationModel>, ActuationError> {
    let limits = config.limits();
    let model: Box<dyn ActuationModel> = match config.model {
        ModelKind::Neural => {
            let model = match &config.weights_path {
                Some(path) => NeuralActuationModel::from_json_file(path, limits)?,
                None => NeuralActuationModel::embedded(limits)?,
            };
            Box::new(model)
        }
        ModelKind::SurfaceFit => Box::new(SurfaceFitModel::new(limits)),
    };
    tracing::info!("actuation model: {}", model.name());
    Ok(model)
}
