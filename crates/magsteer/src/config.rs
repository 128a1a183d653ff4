//! Versioned controller configuration.
//!
//! Every tunable default lives in one of the section structs; a JSON file
//! tagged `magsteer.config.v1` may override any subset of them:
//!
//! ```json
//! {
//!   "schema": "magsteer.config.v1",
//!   "path": { "tolerance": 0.4, "interpolation_distance": 1.0 },
//!   "actuation": { "model": "surface_fit" }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::actuation::{validate_actuation_config, ActuationConfig};
use crate::calibration::{validate_calibration_config, CalibrationConfig};
use crate::localize::{validate_localize_config, LocalizeConfig};
use crate::navigation::{validate_navigation_config, NavigationConfig};
use crate::operation::{validate_operation_config, OperationConfig};
use crate::path::{validate_path_config, PathConfig};
use crate::sim::SimRigConfig;

pub const CONFIG_SCHEMA_V1: &str = "magsteer.config.v1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config schema '{got}' (expected '{expected}')")]
    Schema { expected: &'static str, got: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// All controller settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub calibration: CalibrationConfig,
    pub localize: LocalizeConfig,
    pub path: PathConfig,
    pub navigation: NavigationConfig,
    pub actuation: ActuationConfig,
    pub operation: OperationConfig,
    pub sim: SimRigConfig,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ControllerConfigSpecV1 {
    schema: String,
    #[serde(default)]
    calibration: CalibrationConfig,
    #[serde(default)]
    localize: LocalizeConfig,
    #[serde(default)]
    path: PathConfig,
    #[serde(default)]
    navigation: NavigationConfig,
    #[serde(default)]
    actuation: ActuationConfig,
    #[serde(default)]
    operation: OperationConfig,
    #[serde(default)]
    sim: SimRigConfig,
}

impl ControllerConfig {
    /// Load and validate a config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let cfg = Self::from_json_str(&raw)?;
        tracing::info!("loaded config {}", path.display());
        Ok(cfg)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let spec: ControllerConfigSpecV1 = serde_json::from_str(raw)?;
        if spec.schema != CONFIG_SCHEMA_V1 {
            return Err(ConfigError::Schema {
                expected: CONFIG_SCHEMA_V1,
                got: spec.schema,
            });
        }
        let cfg = Self {
            calibration: spec.calibration,
            localize: spec.localize,
            path: spec.path,
            navigation: spec.navigation,
            actuation: spec.actuation,
            operation: spec.operation,
            sim: spec.sim,
        };
        cfg.validate().map_err(ConfigError::Invalid)?;
        Ok(cfg)
    }

    /// Serialize with the schema tag.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        let spec = ControllerConfigSpecV1 {
            schema: CONFIG_SCHEMA_V1.to_string(),
            calibration: self.calibration.clone(),
            localize: self.localize.clone(),
            path: self.path.clone(),
            navigation: self.navigation.clone(),
            actuation: self.actuation.clone(),
            operation: self.operation.clone(),
            sim: self.sim.clone(),
        };
        Ok(serde_json::to_string_pretty(&spec)?)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_calibration_config(&self.calibration)?;
        validate_localize_config(&self.localize)?;
        validate_path_config(&self.path)?;
        validate_navigation_config(&self.navigation)?;
        validate_actuation_config(&self.actuation)?;
        validate_operation_config(&self.operation)?;
        Ok(())
    }
}
