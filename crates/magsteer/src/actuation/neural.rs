//! Per-coil single-hidden-layer network.
//!
//! Features are `[current.x, current.y, target.x, target.y, distance_to_coil]`,
//! z-scored with one scalar mean/std per coil. The network is
//! `out = b_o + w_o · tanh(W_i · x + b_h)`.

use std::path::Path;

use nalgebra::{SMatrix, SVector};
use serde::Deserialize;

use super::{ActuationError, ActuationModel, CoilQuery, CommandLimits};
use crate::coil::{Coil, CoilSet};

pub const ACTUATION_SCHEMA_V1: &str = "magsteer.actuation.v1";
pub const HIDDEN_UNITS: usize = 10;
pub const FEATURES: usize = 5;

const EMBEDDED_WEIGHTS: &str = include_str!("../../data/actuation_nn.json");

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ActuationWeightsSpecV1 {
    schema: String,
    hidden_units: usize,
    coils: CoilSet<CoilNetworkSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CoilNetworkSpec {
    feature_mean: f64,
    feature_std: f64,
    input_weights: Vec<[f64; FEATURES]>,
    hidden_bias: Vec<f64>,
    output_weights: Vec<f64>,
    output_bias: f64,
}

/// Trained parameters of one coil's network.
#[derive(Debug, Clone, PartialEq)]
pub struct CoilNetwork {
    feature_mean: f64,
    feature_std: f64,
    input_weights: SMatrix<f64, HIDDEN_UNITS, FEATURES>,
    hidden_bias: SVector<f64, HIDDEN_UNITS>,
    output_weights: SVector<f64, HIDDEN_UNITS>,
    output_bias: f64,
}

impl CoilNetwork {
    fn from_spec(coil: Coil, spec: &CoilNetworkSpec) -> Result<Self, ActuationError> {
        let invalid = |reason: String| ActuationError::InvalidWeights { coil, reason };
        if !spec.feature_std.is_finite() || spec.feature_std <= 0.0 {
            return Err(invalid(format!("feature_std must be > 0, got {}", spec.feature_std)));
        }
        let lens = [
            ("input_weights", spec.input_weights.len()),
            ("hidden_bias", spec.hidden_bias.len()),
            ("output_weights", spec.output_weights.len()),
        ];
        for (name, len) in lens {
            if len != HIDDEN_UNITS {
                return Err(invalid(format!("{} has {} rows, expected {}", name, len, HIDDEN_UNITS)));
            }
        }
        Ok(Self {
            feature_mean: spec.feature_mean,
            feature_std: spec.feature_std,
            input_weights: SMatrix::from_fn(|r, c| spec.input_weights[r][c]),
            hidden_bias: SVector::from_fn(|r, _| spec.hidden_bias[r]),
            output_weights: SVector::from_fn(|r, _| spec.output_weights[r]),
            output_bias: spec.output_bias,
        })
    }

    /// Raw network output for an unnormalized feature vector.
    pub fn evaluate(&self, features: [f64; FEATURES]) -> f64 {
        let x = SVector::<f64, FEATURES>::from_fn(|i, _| {
            (features[i] - self.feature_mean) / self.feature_std
        });
        let hidden = (self.input_weights * x + self.hidden_bias).map(f64::tanh);
        self.output_weights.dot(&hidden) + self.output_bias
    }
}

/// Network-based actuation model.
#[derive(Debug, Clone)]
pub struct NeuralActuationModel {
    networks: CoilSet<CoilNetwork>,
    limits: CommandLimits,
}

impl NeuralActuationModel {
    /// Model with the weights compiled into the crate.
    pub fn embedded(limits: CommandLimits) -> Result<Self, ActuationError> {
        Self::from_json_str(EMBEDDED_WEIGHTS, limits)
    }

    pub fn from_json_file(path: &Path, limits: CommandLimits) -> Result<Self, ActuationError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw, limits)
    }

    pub fn from_json_str(raw: &str, limits: CommandLimits) -> Result<Self, ActuationError> {
        let spec: ActuationWeightsSpecV1 = serde_json::from_str(raw)?;
        if spec.schema != ACTUATION_SCHEMA_V1 {
            return Err(ActuationError::Schema {
                expected: ACTUATION_SCHEMA_V1,
                got: spec.schema,
            });
        }
        if spec.hidden_units != HIDDEN_UNITS {
            return Err(ActuationError::InvalidWeights {
                coil: Coil::PlusX,
                reason: format!("hidden_units {} != {}", spec.hidden_units, HIDDEN_UNITS),
            });
        }
        let networks = CoilSet {
            plus_x: CoilNetwork::from_spec(Coil::PlusX, &spec.coils.plus_x)?,
            minus_x: CoilNetwork::from_spec(Coil::MinusX, &spec.coils.minus_x)?,
            plus_y: CoilNetwork::from_spec(Coil::PlusY, &spec.coils.plus_y)?,
            minus_y: CoilNetwork::from_spec(Coil::MinusY, &spec.coils.minus_y)?,
        };
        Ok(Self { networks, limits })
    }

    pub fn network(&self, coil: Coil) -> &CoilNetwork {
        &self.networks[coil]
    }
}

impl ActuationModel for NeuralActuationModel {
    fn name(&self) -> &'static str {
        "neural"
    }

    fn limits(&self) -> CommandLimits {
        self.limits
    }

    fn raw_scale(&self, q: &CoilQuery) -> f64 {
        self.networks[q.coil].evaluate([
            q.current[0],
            q.current[1],
            q.target[0],
            q.target[1],
            q.distance_to_coil,
        ])
    }
}
