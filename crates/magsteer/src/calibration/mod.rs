//! Coordinate-system calibration.
//!
//! Four coil markers are detected over repeated frames, their landmarks are
//! averaged, and an immutable [`CalibrationSnapshot`] is derived:
//!
//! 1. **Average** – per-coil mean of the sampled landmark pixels.
//! 2. **Origin** – intersection of the ±X line with the ±Y line.
//! 3. **Angle** – rotation of the +X landmark relative to the image horizontal.
//! 4. **Scale** – known ±Y coil spacing over the measured pixel spacing.
//! 5. **ROI** – pixel rectangle spanning the four landmarks.
//!
//! A [`BackgroundModel`] (particle-free reference) is built separately while
//! the particle is jogged by [`CalibrationJog`].

mod background;
mod calibrator;
mod jog;
mod snapshot;

pub use background::BackgroundModel;
pub use calibrator::{coil_landmark, CalibrationStatus, CoordinateCalibrator};
pub use jog::{CalibrationJog, JogConfig, JogStep};
pub use snapshot::CalibrationSnapshot;

use crate::coil::{Coil, CoilSet};
use crate::fiducial::MarkerDetectConfig;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("system has not been calibrated")]
    NotCalibrated,
    #[error("no calibration samples were recorded")]
    NoSamples,
    #[error("coil {0} marker was never detected during calibration")]
    CoilNotDetected(Coil),
    #[error("coil axes are parallel; cannot locate the origin")]
    ParallelAxes,
    #[error("degenerate calibration geometry: {0}")]
    DegenerateGeometry(String),
    #[error("frame size {got:?} does not match {expected:?}")]
    FrameSizeMismatch { expected: [u32; 2], got: [u32; 2] },
}

/// Calibration tuning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Frames sampled before the landmarks are averaged.
    pub sample_limit: usize,
    /// Physical distance between the +Y and −Y landmarks.
    pub coil_spacing: f64,
    /// Frames averaged into the background model.
    pub background_frames: usize,
    /// Marker id mounted on each coil.
    pub marker_ids: CoilSet<u32>,
    #[serde(default)]
    pub markers: MarkerDetectConfig,
    #[serde(default)]
    pub jog: JogConfig,
}

impl CalibrationConfig {
    pub const DEFAULT_SAMPLE_LIMIT: usize = 20;
    pub const DEFAULT_COIL_SPACING_MM: f64 = 53.0;
    pub const DEFAULT_BACKGROUND_FRAMES: usize = 12;
    pub const DEFAULT_MARKER_IDS: CoilSet<u32> = CoilSet {
        plus_x: 10,
        minus_x: 17,
        plus_y: 34,
        minus_y: 37,
    };
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_limit: Self::DEFAULT_SAMPLE_LIMIT,
            coil_spacing: Self::DEFAULT_COIL_SPACING_MM,
            background_frames: Self::DEFAULT_BACKGROUND_FRAMES,
            marker_ids: Self::DEFAULT_MARKER_IDS,
            markers: MarkerDetectConfig::default(),
            jog: JogConfig::default(),
        }
    }
}

pub(crate) fn validate_calibration_config(cfg: &CalibrationConfig) -> Result<(), String> {
    if cfg.sample_limit == 0 {
        return Err("calibration.sample_limit must be >= 1".to_string());
    }
    if !cfg.coil_spacing.is_finite() || cfg.coil_spacing <= 0.0 {
        return Err("calibration.coil_spacing must be finite and > 0".to_string());
    }
    if cfg.background_frames == 0 {
        return Err("calibration.background_frames must be >= 1".to_string());
    }
    let ids: Vec<u32> = cfg.marker_ids.iter().map(|(_, id)| *id).collect();
    for (i, id) in ids.iter().enumerate() {
        if ids[i + 1..].contains(id) {
            return Err(format!("calibration.marker_ids reuses id {}", id));
        }
    }
    Ok(())
}
