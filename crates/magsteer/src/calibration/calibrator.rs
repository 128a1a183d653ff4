//! Marker sampling state machine: `Uncalibrated → Sampling(k/N) → Calibrated`.

use image::GrayImage;

use crate::coil::{Coil, CoilSet};
use crate::fiducial::{DetectedMarker, MarkerDetector};
use crate::geometry::midpoint;

use super::{CalibrationConfig, CalibrationError, CalibrationSnapshot};

/// Where the calibrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalibrationStatus {
    Uncalibrated,
    Sampling { collected: usize, limit: usize },
    Calibrated,
}

/// Landmark of a coil: midpoint of the two marker corners that face the
/// workspace interior under the standard mounting.
pub fn coil_landmark(coil: Coil, corners: &[[f64; 2]; 4]) -> [f64; 2] {
    let (a, b) = match coil {
        Coil::PlusX => (0, 3),
        Coil::MinusX => (1, 2),
        Coil::PlusY => (3, 2),
        Coil::MinusY => (0, 1),
    };
    midpoint(corners[a], corners[b])
}

/// Accumulates coil landmark samples and produces a [`CalibrationSnapshot`].
#[derive(Debug, Clone)]
pub struct CoordinateCalibrator {
    config: CalibrationConfig,
    detector: MarkerDetector,
    frames_sampled: usize,
    sums: CoilSet<[f64; 2]>,
    counts: CoilSet<usize>,
    image_size: Option<[u32; 2]>,
    snapshot: Option<CalibrationSnapshot>,
}

impl CoordinateCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        let detector = MarkerDetector::new(Default::default(), config.markers.clone());
        Self::with_detector(config, detector)
    }

    pub fn with_detector(config: CalibrationConfig, detector: MarkerDetector) -> Self {
        Self {
            config,
            detector,
            frames_sampled: 0,
            sums: CoilSet::default(),
            counts: CoilSet::default(),
            image_size: None,
            snapshot: None,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn status(&self) -> CalibrationStatus {
        if self.snapshot.is_some() {
            CalibrationStatus::Calibrated
        } else if self.frames_sampled == 0 {
            CalibrationStatus::Uncalibrated
        } else {
            CalibrationStatus::Sampling {
                collected: self.frames_sampled,
                limit: self.config.sample_limit,
            }
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The frozen coordinate frame.
    pub fn snapshot(&self) -> Result<&CalibrationSnapshot, CalibrationError> {
        self.snapshot.as_ref().ok_or(CalibrationError::NotCalibrated)
    }

    pub fn map_to_physical(&self, px: [f64; 2]) -> Result<[f64; 2], CalibrationError> {
        Ok(self.snapshot()?.map_to_physical(px))
    }

    pub fn map_to_pixel(&self, physical: [f64; 2]) -> Result<[f64; 2], CalibrationError> {
        Ok(self.snapshot()?.map_to_pixel(physical))
    }

    /// Run marker detection on `frame` and record one calibration sample.
    pub fn sample_frame(&mut self, frame: &GrayImage) -> Result<CalibrationStatus, CalibrationError> {
        if self.is_calibrated() {
            return Ok(CalibrationStatus::Calibrated);
        }
        let markers = self.detector.detect(frame);
        self.sample_detections(&markers, [frame.width(), frame.height()])
    }

    /// Record one calibration sample from already detected markers.
    ///
    /// A coil whose marker is missing simply contributes no sample for this
    /// frame. After `sample_limit` frames the calibration is finalized.
    pub fn sample_detections(
        &mut self,
        markers: &[DetectedMarker],
        image_size: [u32; 2],
    ) -> Result<CalibrationStatus, CalibrationError> {
        if self.is_calibrated() {
            return Ok(CalibrationStatus::Calibrated);
        }
        if let Some(expected) = self.image_size {
            if expected != image_size {
                return Err(CalibrationError::FrameSizeMismatch {
                    expected,
                    got: image_size,
                });
            }
        }
        self.image_size = Some(image_size);

        for coil in Coil::ALL {
            let id = self.config.marker_ids[coil];
            match markers.iter().find(|m| m.id == id) {
                Some(m) => {
                    let p = coil_landmark(coil, &m.corners);
                    self.sums[coil][0] += p[0];
                    self.sums[coil][1] += p[1];
                    self.counts[coil] += 1;
                }
                None => tracing::debug!(
                    "marker {} ({}) not found in calibration frame {}",
                    id,
                    coil,
                    self.frames_sampled + 1
                ),
            }
        }
        self.frames_sampled += 1;
        tracing::debug!(
            "calibration sample {}/{}",
            self.frames_sampled,
            self.config.sample_limit
        );

        if self.frames_sampled >= self.config.sample_limit {
            self.finalize()?;
        }
        Ok(self.status())
    }

    /// Average the samples and derive the coordinate frame.
    ///
    /// Fails with a configuration error if a coil was never seen or the
    /// geometry is degenerate; the sample buffer is then cleared so the
    /// caller can start over.
    pub fn finalize(&mut self) -> Result<&CalibrationSnapshot, CalibrationError> {
        if self.snapshot.is_none() {
            match self.compute_snapshot() {
                Ok(snap) => {
                    tracing::info!(
                        "calibrated: origin=({:.1}, {:.1})px angle={:.4}rad scale={:.5}/px",
                        snap.origin_px()[0],
                        snap.origin_px()[1],
                        snap.axis_angle(),
                        snap.distance_per_pixel()
                    );
                    self.snapshot = Some(snap);
                }
                Err(e) => {
                    tracing::warn!("calibration failed: {}", e);
                    self.reset();
                    return Err(e);
                }
            }
        }
        self.snapshot()
    }

    fn compute_snapshot(&self) -> Result<CalibrationSnapshot, CalibrationError> {
        let image_size = self.image_size.ok_or(CalibrationError::NoSamples)?;
        let mut averaged = CoilSet::<[f64; 2]>::default();
        for coil in Coil::ALL {
            let n = self.counts[coil];
            if n == 0 {
                return Err(CalibrationError::CoilNotDetected(coil));
            }
            if n < self.frames_sampled {
                tracing::warn!(
                    "coil {} seen in only {}/{} calibration frames",
                    coil,
                    n,
                    self.frames_sampled
                );
            }
            let s = self.sums[coil];
            averaged[coil] = [s[0] / n as f64, s[1] / n as f64];
        }
        CalibrationSnapshot::from_coil_pixels(averaged, image_size, self.config.coil_spacing)
    }

    /// Adopt a previously saved snapshot.
    pub fn restore(&mut self, snapshot: CalibrationSnapshot) {
        self.reset();
        self.image_size = Some(snapshot.image_size());
        self.snapshot = Some(snapshot);
    }

    /// Back to `Uncalibrated`: clears samples and every derived quantity.
    pub fn reset(&mut self) {
        self.frames_sampled = 0;
        self.sums = CoilSet::default();
        self.counts = CoilSet::default();
        self.image_size = None;
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::draw_rig;
    use approx::assert_abs_diff_eq;

    fn small_config(limit: usize) -> CalibrationConfig {
        CalibrationConfig {
            sample_limit: limit,
            ..Default::default()
        }
    }

    fn marker(id: u32, tl: [f64; 2], side: f64) -> DetectedMarker {
        DetectedMarker {
            id,
            corners: [
                tl,
                [tl[0] + side, tl[1]],
                [tl[0] + side, tl[1] + side],
                [tl[0], tl[1] + side],
            ],
            bit_errors: 0,
        }
    }

    /// Upright markers around (200, 150): landmarks at ±100 px.
    fn rig_markers(jitter: f64) -> Vec<DetectedMarker> {
        vec![
            marker(10, [300.0 + jitter, 130.0], 40.0),
            marker(17, [60.0 - jitter, 130.0], 40.0),
            marker(34, [180.0, 10.0 + jitter], 40.0),
            marker(37, [180.0, 250.0 - jitter], 40.0),
        ]
    }

    #[test]
    fn landmark_corner_convention() {
        let m = marker(10, [0.0, 0.0], 10.0);
        assert_eq!(coil_landmark(Coil::PlusX, &m.corners), [0.0, 5.0]);
        assert_eq!(coil_landmark(Coil::MinusX, &m.corners), [10.0, 5.0]);
        assert_eq!(coil_landmark(Coil::PlusY, &m.corners), [5.0, 10.0]);
        assert_eq!(coil_landmark(Coil::MinusY, &m.corners), [5.0, 0.0]);
    }

    #[test]
    fn state_machine_progresses_and_averages_jitter() {
        let mut cal = CoordinateCalibrator::new(small_config(4));
        assert_eq!(cal.status(), CalibrationStatus::Uncalibrated);
        assert!(matches!(cal.map_to_physical([0.0, 0.0]), Err(CalibrationError::NotCalibrated)));

        for (k, j) in [1.0, -1.0, 2.0].into_iter().enumerate() {
            let st = cal.sample_detections(&rig_markers(j), [400, 300]).unwrap();
            assert_eq!(st, CalibrationStatus::Sampling { collected: k + 1, limit: 4 });
        }
        let st = cal.sample_detections(&rig_markers(-2.0), [400, 300]).unwrap();
        assert_eq!(st, CalibrationStatus::Calibrated);

        let snap = cal.snapshot().unwrap();
        assert_abs_diff_eq!(snap.origin_px()[0], 200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(snap.origin_px()[1], 150.0, epsilon = 1e-9);
        assert_abs_diff_eq!(snap.distance_per_pixel(), 53.0 / 200.0, epsilon = 1e-9);

        // further frames are ignored once calibrated
        let st = cal.sample_detections(&[], [400, 300]).unwrap();
        assert_eq!(st, CalibrationStatus::Calibrated);
    }

    #[test]
    fn missing_markers_only_reduce_sample_count() {
        let mut cal = CoordinateCalibrator::new(small_config(3));
        let mut partial = rig_markers(0.0);
        partial.retain(|m| m.id != 34);
        cal.sample_detections(&partial, [400, 300]).unwrap();
        cal.sample_detections(&rig_markers(0.0), [400, 300]).unwrap();
        let st = cal.sample_detections(&partial, [400, 300]).unwrap();
        assert_eq!(st, CalibrationStatus::Calibrated);
        assert_abs_diff_eq!(cal.snapshot().unwrap().origin_px()[1], 150.0, epsilon = 1e-9);
    }

    #[test]
    fn never_seen_coil_fails_and_resets() {
        let mut cal = CoordinateCalibrator::new(small_config(2));
        let mut partial = rig_markers(0.0);
        partial.retain(|m| m.id != 17);
        cal.sample_detections(&partial, [400, 300]).unwrap();
        let err = cal.sample_detections(&partial, [400, 300]).unwrap_err();
        assert!(matches!(err, CalibrationError::CoilNotDetected(Coil::MinusX)));
        assert_eq!(cal.status(), CalibrationStatus::Uncalibrated);
    }

    #[test]
    fn reset_is_reentrant() {
        let mut cal = CoordinateCalibrator::new(small_config(1));
        cal.sample_detections(&rig_markers(0.0), [400, 300]).unwrap();
        assert!(cal.is_calibrated());
        cal.reset();
        assert_eq!(cal.status(), CalibrationStatus::Uncalibrated);
        assert!(cal.snapshot().is_err());
        cal.sample_detections(&rig_markers(0.0), [400, 300]).unwrap();
        assert!(cal.is_calibrated());
    }

    #[test]
    fn calibrates_from_rendered_frames() {
        let frame = draw_rig([400, 320], [200.0, 160.0], 130.0, 48.0);
        let mut cal = CoordinateCalibrator::new(small_config(2));
        cal.sample_frame(&frame).unwrap();
        let st = cal.sample_frame(&frame).unwrap();
        assert_eq!(st, CalibrationStatus::Calibrated);

        let snap = cal.snapshot().unwrap();
        assert!((snap.origin_px()[0] - 200.0).abs() < 1.5);
        assert!((snap.origin_px()[1] - 160.0).abs() < 1.5);
        assert!(snap.axis_angle().abs() < 0.02);
        // landmarks sit on the inner marker edges: 130 - 24 px from center
        let expected_dpp = 53.0 / (2.0 * (130.0 - 24.0));
        assert!((snap.distance_per_pixel() - expected_dpp).abs() / expected_dpp < 0.02);
    }
}
