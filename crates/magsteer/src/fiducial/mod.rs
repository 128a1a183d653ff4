//! Square binary fiducial markers marking the coil positions.
//!
//! Each marker is a 6×6 cell grid: a dark one-cell border around a 4×4
//! payload. Detection runs in three stages:
//!
//! 1. **Binarize** – Otsu level, dark pixels become foreground.
//! 2. **Quads** – outer contours that fit a convex quadrilateral.
//! 3. **Decode** – sample the cell grid through a square-to-quad homography
//!    for each cyclic corner ordering and match the payload against the
//!    [`MarkerDictionary`].
//!
//! Corners of a [`DetectedMarker`] follow the clockwise convention
//! top-left, top-right, bottom-right, bottom-left of the marker's canonical
//! orientation. A marker that is not visible is simply absent from the result.

mod detect;
mod dictionary;
pub(crate) mod homography;

pub use dictionary::{DictionaryMatch, MarkerDictionary, MarkerEntry};

use image::GrayImage;

/// A decoded marker in image pixel coordinates.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    /// Corners in canonical order (TL, TR, BR, BL).
    pub corners: [[f64; 2]; 4],
    /// Payload bits corrected during matching.
    pub bit_errors: u32,
}

impl DetectedMarker {
    pub fn center(&self) -> [f64; 2] {
        let sx: f64 = self.corners.iter().map(|c| c[0]).sum();
        let sy: f64 = self.corners.iter().map(|c| c[1]).sum();
        [sx / 4.0, sy / 4.0]
    }
}

/// Tuning for marker detection.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MarkerDetectConfig {
    /// Contours shorter than this (pixels) are not considered.
    pub min_perimeter_px: f64,
    /// Allowed contour-to-quad deviation as a fraction of the perimeter.
    pub quad_tolerance_ratio: f64,
    /// Lower bound on the quad deviation tolerance (pixels).
    pub min_quad_tolerance_px: f64,
    /// Minimum gray-level spread between darkest and brightest cell.
    pub min_cell_contrast: f64,
    /// Border cells allowed to read white.
    pub max_border_errors: u32,
    /// Payload bit errors tolerated when matching the dictionary.
    pub max_correction_bits: u32,
}

impl MarkerDetectConfig {
    pub const DEFAULT_MIN_PERIMETER_PX: f64 = 40.0;
    pub const DEFAULT_QUAD_TOLERANCE_RATIO: f64 = 0.04;
    pub const DEFAULT_MIN_QUAD_TOLERANCE_PX: f64 = 1.5;
    pub const DEFAULT_MIN_CELL_CONTRAST: f64 = 30.0;
    pub const DEFAULT_MAX_BORDER_ERRORS: u32 = 2;
    pub const DEFAULT_MAX_CORRECTION_BITS: u32 = 1;
}

impl Default for MarkerDetectConfig {
    fn default() -> Self {
        Self {
            min_perimeter_px: Self::DEFAULT_MIN_PERIMETER_PX,
            quad_tolerance_ratio: Self::DEFAULT_QUAD_TOLERANCE_RATIO,
            min_quad_tolerance_px: Self::DEFAULT_MIN_QUAD_TOLERANCE_PX,
            min_cell_contrast: Self::DEFAULT_MIN_CELL_CONTRAST,
            max_border_errors: Self::DEFAULT_MAX_BORDER_ERRORS,
            max_correction_bits: Self::DEFAULT_MAX_CORRECTION_BITS,
        }
    }
}

/// Detects dictionary markers in grayscale frames.
#[derive(Debug, Clone, Default)]
pub struct MarkerDetector {
    dictionary: MarkerDictionary,
    config: MarkerDetectConfig,
}

impl MarkerDetector {
    pub fn new(dictionary: MarkerDictionary, config: MarkerDetectConfig) -> Self {
        Self { dictionary, config }
    }

    pub fn dictionary(&self) -> &MarkerDictionary {
        &self.dictionary
    }

    /// Detect all dictionary markers in `gray`.
    ///
    /// When the same id decodes more than once, the instance with the fewest
    /// corrected bits is kept.
    pub fn detect(&self, gray: &GrayImage) -> Vec<DetectedMarker> {
        let level = imageproc::contrast::otsu_level(gray);
        let binary = detect::binarize_dark(gray, level);
        let quads = detect::quad_candidates(&binary, &self.config);

        let mut markers: Vec<DetectedMarker> = Vec::new();
        for quad in &quads {
            let Some(m) = detect::decode_quad(gray, quad, &self.dictionary, &self.config) else {
                continue;
            };
            match markers.iter_mut().find(|o| o.id == m.id) {
                Some(existing) if m.bit_errors < existing.bit_errors => *existing = m,
                Some(_) => {}
                None => markers.push(m),
            }
        }

        tracing::debug!(
            "marker detection: {} quads, {} decoded (otsu level {})",
            quads.len(),
            markers.len(),
            level
        );
        markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{draw_marker, marker_corner};
    use image::{GrayImage, Luma};

    fn blank(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([220u8]))
    }

    #[test]
    fn detects_upright_marker_with_canonical_corners() {
        let dict = MarkerDictionary::default();
        let mut img = blank(200, 160);
        draw_marker(&mut img, dict.code(10).unwrap(), [100.0, 80.0], 60.0, 0.0);

        let found = MarkerDetector::default().detect(&img);
        assert_eq!(found.len(), 1);
        let m = &found[0];
        assert_eq!(m.id, 10);
        assert_eq!(m.bit_errors, 0);
        for k in 0..4 {
            let expected = marker_corner([100.0, 80.0], 60.0, 0.0, k);
            let d = crate::geometry::distance(m.corners[k], expected);
            assert!(d < 2.0, "corner {k} off by {d}");
        }
    }

    #[test]
    fn rotated_marker_reports_rotated_corner_order() {
        let dict = MarkerDictionary::default();
        let mut img = blank(220, 220);
        let angle = 0.5 * std::f64::consts::PI + 0.2;
        draw_marker(&mut img, dict.code(37).unwrap(), [110.0, 110.0], 72.0, angle);

        let found = MarkerDetector::default().detect(&img);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 37);
        let expected = marker_corner([110.0, 110.0], 72.0, angle, 0);
        assert!(crate::geometry::distance(found[0].corners[0], expected) < 3.0);
    }

    #[test]
    fn all_coil_markers_found_and_unknown_pattern_ignored() {
        let dict = MarkerDictionary::default();
        let mut img = blank(400, 400);
        draw_marker(&mut img, dict.code(10).unwrap(), [330.0, 200.0], 48.0, 0.0);
        draw_marker(&mut img, dict.code(17).unwrap(), [70.0, 200.0], 48.0, 0.0);
        draw_marker(&mut img, dict.code(34).unwrap(), [200.0, 70.0], 48.0, 0.0);
        draw_marker(&mut img, dict.code(37).unwrap(), [200.0, 330.0], 48.0, 0.0);
        // payload far from every codeword
        draw_marker(&mut img, 0xFFFF, [200.0, 200.0], 48.0, 0.0);

        let mut ids: Vec<u32> = MarkerDetector::default()
            .detect(&img)
            .into_iter()
            .map(|m| m.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 17, 34, 37]);
    }

    #[test]
    fn empty_frame_yields_nothing() {
        assert!(MarkerDetector::default().detect(&blank(64, 64)).is_empty());
    }
}
