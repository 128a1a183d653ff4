//! Particle localization by background subtraction.
//!
//! Per frame: crop to the calibrated workspace, smooth with an
//! edge-preserving median filter, subtract from the background, threshold,
//! dilate to merge fragments, trace external contours, and pick the
//! qualifying blob with the largest bounding box. The particle is darker than
//! the background, so the difference `background − frame` is positive on it.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;

use crate::calibration::{BackgroundModel, CalibrationSnapshot};
use crate::geometry::{signed_area, PixelRect};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocalizeError {
    #[error("background model is not ready")]
    BackgroundNotReady,
    #[error("frame size {got:?} does not match calibrated size {expected:?}")]
    FrameSizeMismatch { expected: [u32; 2], got: [u32; 2] },
    #[error("calibrated workspace {0:?} lies outside the frame")]
    RoiOutOfBounds(PixelRect),
}

/// Localization tuning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LocalizeConfig {
    /// Median filter radius (0 disables smoothing).
    pub blur_radius: u32,
    /// Difference level above which a pixel belongs to the particle.
    pub threshold: u8,
    /// L1 dilation radius applied to the thresholded difference.
    pub dilation_radius: u8,
    /// Accepted contour area range in pixels (inclusive).
    pub min_area: f64,
    pub max_area: f64,
}

impl LocalizeConfig {
    pub const DEFAULT_BLUR_RADIUS: u32 = 1;
    pub const DEFAULT_THRESHOLD: u8 = 70;
    pub const DEFAULT_DILATION_RADIUS: u8 = 6;
    pub const DEFAULT_MIN_AREA: f64 = 20.0;
    pub const DEFAULT_MAX_AREA: f64 = 1500.0;
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self {
            blur_radius: Self::DEFAULT_BLUR_RADIUS,
            threshold: Self::DEFAULT_THRESHOLD,
            dilation_radius: Self::DEFAULT_DILATION_RADIUS,
            min_area: Self::DEFAULT_MIN_AREA,
            max_area: Self::DEFAULT_MAX_AREA,
        }
    }
}

pub(crate) fn validate_localize_config(cfg: &LocalizeConfig) -> Result<(), String> {
    if !cfg.min_area.is_finite() || cfg.min_area < 0.0 {
        return Err("localize.min_area must be finite and >= 0".to_string());
    }
    if !cfg.max_area.is_finite() || cfg.max_area < cfg.min_area {
        return Err("localize.max_area must be finite and >= min_area".to_string());
    }
    Ok(())
}

/// A qualifying blob found in the workspace crop.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Blob {
    /// Inclusive pixel bounds within the crop: `[x_min, y_min, x_max, y_max]`.
    bounds: [i32; 4],
}

impl Blob {
    fn box_area(&self) -> i64 {
        let [x0, y0, x1, y1] = self.bounds;
        (x1 - x0 + 1) as i64 * (y1 - y0 + 1) as i64
    }

    fn center(&self) -> [f64; 2] {
        let [x0, y0, x1, y1] = self.bounds;
        [0.5 * (x0 + x1) as f64, 0.5 * (y0 + y1) as f64]
    }
}

/// Reports the particle's pixel location in full-frame coordinates.
#[derive(Debug, Clone)]
pub struct ParticleLocalizer {
    config: LocalizeConfig,
    roi: PixelRect,
    frame_size: [u32; 2],
    background: Option<GrayImage>,
    last_location: Option<[f64; 2]>,
}

impl ParticleLocalizer {
    pub fn new(config: LocalizeConfig, snapshot: &CalibrationSnapshot) -> Self {
        Self {
            config,
            roi: snapshot.roi(),
            frame_size: snapshot.image_size(),
            background: None,
            last_location: None,
        }
    }

    /// Install the completed background, cropped to the workspace.
    pub fn set_background(&mut self, model: &BackgroundModel) -> Result<(), LocalizeError> {
        let image = model.image().ok_or(LocalizeError::BackgroundNotReady)?;
        self.check_frame(image)?;
        let r = self.roi;
        self.background =
            Some(image::imageops::crop_imm(image, r.x, r.y, r.width, r.height).to_image());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.background.is_some()
    }

    /// Last known particle location (full-frame pixels).
    pub fn last_location(&self) -> Option<[f64; 2]> {
        self.last_location
    }

    /// Forget the last known location.
    pub fn clear_location(&mut self) {
        self.last_location = None;
    }

    fn check_frame(&self, frame: &GrayImage) -> Result<(), LocalizeError> {
        let got = [frame.width(), frame.height()];
        if got != self.frame_size {
            return Err(LocalizeError::FrameSizeMismatch {
                expected: self.frame_size,
                got,
            });
        }
        if !self.roi.fits_within(got) {
            return Err(LocalizeError::RoiOutOfBounds(self.roi));
        }
        Ok(())
    }

    /// Locate the particle in `frame`.
    ///
    /// If no blob qualifies the previous location is kept. Returns `None`
    /// only while the particle has never been seen.
    pub fn locate(&mut self, frame: &GrayImage) -> Result<Option<[f64; 2]>, LocalizeError> {
        let background = self.background.as_ref().ok_or(LocalizeError::BackgroundNotReady)?;
        self.check_frame(frame)?;

        let r = self.roi;
        let crop = image::imageops::crop_imm(frame, r.x, r.y, r.width, r.height).to_image();
        let mask = foreground_mask(background, &crop, &self.config);

        match best_blob(&mask, &self.config) {
            Some(blob) => {
                let c = blob.center();
                let loc = [c[0] + r.x as f64, c[1] + r.y as f64];
                self.last_location = Some(loc);
            }
            None => tracing::debug!(
                "no particle blob in [{}, {}] px², keeping {:?}",
                self.config.min_area,
                self.config.max_area,
                self.last_location
            ),
        }
        Ok(self.last_location)
    }
}

/// Binary mask of pixels darker than the background by more than the
/// threshold, dilated.
fn foreground_mask(background: &GrayImage, crop: &GrayImage, cfg: &LocalizeConfig) -> GrayImage {
    let smoothed = if cfg.blur_radius > 0 {
        imageproc::filter::median_filter(crop, cfg.blur_radius, cfg.blur_radius)
    } else {
        crop.clone()
    };

    let binary = GrayImage::from_fn(crop.width(), crop.height(), |x, y| {
        let diff = background
            .get_pixel(x, y)[0]
            .saturating_sub(smoothed.get_pixel(x, y)[0]);
        image::Luma([if diff > cfg.threshold { 255 } else { 0 }])
    });

    // Binary dilation after thresholding equals thresholding after a
    // grayscale (max) dilation with the same structuring element.
    if cfg.dilation_radius > 0 {
        imageproc::morphology::dilate(&binary, Norm::L1, cfg.dilation_radius)
    } else {
        binary
    }
}

/// External contour with area in range and the largest bounding box; the
/// first one found wins ties.
fn best_blob(mask: &GrayImage, cfg: &LocalizeConfig) -> Option<Blob> {
    let mut best: Option<Blob> = None;
    for contour in find_contours::<i32>(mask) {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let pts: Vec<[f64; 2]> = contour
            .points
            .iter()
            .map(|p| [p.x as f64, p.y as f64])
            .collect();
        let area = signed_area(&pts).abs();
        if area < cfg.min_area || area > cfg.max_area {
            continue;
        }

        let mut bounds = [i32::MAX, i32::MAX, i32::MIN, i32::MIN];
        for p in &contour.points {
            bounds[0] = bounds[0].min(p.x);
            bounds[1] = bounds[1].min(p.y);
            bounds[2] = bounds[2].max(p.x);
            bounds[3] = bounds[3].max(p.y);
        }
        let blob = Blob { bounds };
        if best.map_or(true, |b| blob.box_area() > b.box_area()) {
            best = Some(blob);
        }
    }
    best
}
