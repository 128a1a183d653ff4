//! Delivery paths: checkpoints, discretization and path files.
//!
//! A path starts as the sparse list of user-placed checkpoints. Before
//! traversal it is densified by midpoint insertion until no two consecutive
//! points are farther apart than the interpolation distance. Inserted points
//! are never checkpoints.

mod file;

pub use file::{format_path, parse_path, read_path_file, write_path_file};

use crate::calibration::CalibrationSnapshot;
use crate::geometry::{distance, midpoint};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path has no checkpoints")]
    Empty,
    #[error("deviation tolerance must be > 0, got {0}")]
    NonPositiveTolerance(f64),
    #[error("interpolation distance must be > 0, got {0}")]
    NonPositiveInterpolation(f64),
    #[error("path point {index} has a non-finite coordinate")]
    NonFinitePoint { index: usize },
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("path file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Tolerance and interpolation used when an operation is set up.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Deviation at which a target point counts as reached.
    pub tolerance: f64,
    /// Largest allowed gap between consecutive path points.
    pub interpolation_distance: f64,
    /// Screen pixels per native pixel for the screen representation.
    #[serde(default = "default_screen_scale")]
    pub screen_scale: f64,
}

fn default_screen_scale() -> f64 {
    PathConfig::DEFAULT_SCREEN_SCALE
}

impl PathConfig {
    pub const DEFAULT_TOLERANCE: f64 = 0.5;
    pub const DEFAULT_INTERPOLATION_DISTANCE: f64 = 2.0;
    pub const DEFAULT_SCREEN_SCALE: f64 = 1.0;
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            interpolation_distance: Self::DEFAULT_INTERPOLATION_DISTANCE,
            screen_scale: Self::DEFAULT_SCREEN_SCALE,
        }
    }
}

pub(crate) fn validate_path_config(cfg: &PathConfig) -> Result<(), String> {
    if !(cfg.tolerance > 0.0) {
        return Err("path.tolerance must be > 0".to_string());
    }
    if !(cfg.interpolation_distance > 0.0) {
        return Err("path.interpolation_distance must be > 0".to_string());
    }
    if !(cfg.screen_scale > 0.0) || !cfg.screen_scale.is_finite() {
        return Err("path.screen_scale must be finite and > 0".to_string());
    }
    Ok(())
}

/// Reject an empty path or non-positive parameters before any work is done.
pub fn validate_path_params(
    checkpoints: usize,
    tolerance: f64,
    interpolation_distance: f64,
) -> Result<(), PathError> {
    if checkpoints == 0 {
        return Err(PathError::Empty);
    }
    if !(tolerance > 0.0) {
        return Err(PathError::NonPositiveTolerance(tolerance));
    }
    if !(interpolation_distance > 0.0) {
        return Err(PathError::NonPositiveInterpolation(interpolation_distance));
    }
    Ok(())
}

/// One path point in screen pixels, native camera pixels and physical units.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PathPoint {
    pub pixel_screen: [f64; 2],
    pub pixel_native: [f64; 2],
    pub physical: [f64; 2],
    pub is_checkpoint: bool,
}

impl PathPoint {
    /// Checkpoint at a physical location, with pixel representations derived
    /// from `snapshot`.
    pub fn checkpoint(physical: [f64; 2], snapshot: &CalibrationSnapshot, screen_scale: f64) -> Self {
        let native = snapshot.map_to_pixel(physical);
        Self {
            pixel_screen: [native[0] * screen_scale, native[1] * screen_scale],
            pixel_native: native,
            physical,
            is_checkpoint: true,
        }
    }

    /// Interpolated point halfway between `a` and `b` in every representation.
    pub fn between(a: &PathPoint, b: &PathPoint) -> Self {
        Self {
            pixel_screen: midpoint(a.pixel_screen, b.pixel_screen),
            pixel_native: midpoint(a.pixel_native, b.pixel_native),
            physical: midpoint(a.physical, b.physical),
            is_checkpoint: false,
        }
    }
}

/// Ordered sequence of path points.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeliveryPath {
    points: Vec<PathPoint>,
}

impl DeliveryPath {
    pub fn new(points: Vec<PathPoint>) -> Self {
        Self { points }
    }

    /// Checkpoints at the given physical locations.
    pub fn from_physical_checkpoints(
        points: &[[f64; 2]],
        snapshot: &CalibrationSnapshot,
        screen_scale: f64,
    ) -> Self {
        Self::new(
            points
                .iter()
                .map(|&p| PathPoint::checkpoint(p, snapshot, screen_scale))
                .collect(),
        )
    }

    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&PathPoint> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &PathPoint> + '_ {
        self.points.iter().filter(|p| p.is_checkpoint)
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints().count()
    }

    pub fn physical_points(&self) -> Vec<[f64; 2]> {
        self.points.iter().map(|p| p.physical).collect()
    }

    /// Physical length of the polyline.
    pub fn total_distance(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| distance(w[0].physical, w[1].physical))
            .sum()
    }

    /// Tail of the path starting at checkpoint number `checkpoint` (0-based),
    /// keeping only checkpoints.
    pub fn from_checkpoint(&self, checkpoint: usize) -> DeliveryPath {
        Self::new(self.checkpoints().skip(checkpoint).copied().collect())
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Insert midpoints until every gap is at most `interpolation_distance`.
    ///
    /// After an insertion the gap between the left point and the new midpoint
    /// is checked again before moving on. Returns the number of inserted
    /// points.
    pub fn discretize(&mut self, interpolation_distance: f64) -> Result<usize, PathError> {
        if self.points.is_empty() {
            return Err(PathError::Empty);
        }
        if !(interpolation_distance > 0.0) {
            return Err(PathError::NonPositiveInterpolation(interpolation_distance));
        }
        if let Some(index) = self
            .points
            .iter()
            .position(|p| !(p.physical[0].is_finite() && p.physical[1].is_finite()))
        {
            return Err(PathError::NonFinitePoint { index });
        }

        let mut inserted = 0;
        loop {
            let mut dense = true;
            let mut i = 1;
            while i < self.points.len() {
                let (a, b) = (&self.points[i - 1], &self.points[i]);
                if distance(a.physical, b.physical) > interpolation_distance {
                    let mid = PathPoint::between(a, b);
                    self.points.insert(i, mid);
                    inserted += 1;
                    dense = false;
                    continue;
                }
                i += 1;
            }
            if dense {
                break;
            }
        }
        tracing::debug!(
            "discretized path: {} points ({} inserted, gap <= {})",
            self.points.len(),
            inserted,
            interpolation_distance
        );
        Ok(inserted)
    }
}

#[cfg(test)]
pub(crate) fn physical_checkpoint(p: [f64; 2]) -> PathPoint {
    PathPoint {
        pixel_screen: p,
        pixel_native: p,
        physical: p,
        is_checkpoint: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coil::CoilSet;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn path(points: &[[f64; 2]]) -> DeliveryPath {
        DeliveryPath::new(points.iter().map(|&p| physical_checkpoint(p)).collect())
    }

    #[test]
    fn straight_segment_is_bisected() {
        let mut p = path(&[[0.0, 0.0], [10.0, 0.0]]);
        let inserted = p.discretize(2.0).unwrap();
        let xs: Vec<f64> = p.points().iter().map(|q| q.physical[0]).collect();
        assert_eq!(xs, vec![0.0, 1.25, 2.5, 3.75, 5.0, 6.25, 7.5, 8.75, 10.0]);
        assert_eq!(inserted, 7);
        assert_eq!(p.checkpoint_count(), 2);
        assert!(p.points()[0].is_checkpoint && p.points()[8].is_checkpoint);
        assert!(p.points()[1..8].iter().all(|q| !q.is_checkpoint));
    }

    #[test]
    fn power_of_two_span_hits_exact_spacing() {
        let mut p = path(&[[0.0, 0.0], [8.0, 0.0]]);
        p.discretize(2.0).unwrap();
        let xs: Vec<f64> = p.points().iter().map(|q| q.physical[0]).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn midpoints_cover_every_representation() {
        let a = PathPoint {
            pixel_screen: [0.0, 0.0],
            pixel_native: [10.0, 20.0],
            physical: [0.0, 0.0],
            is_checkpoint: true,
        };
        let b = PathPoint {
            pixel_screen: [4.0, 8.0],
            pixel_native: [30.0, 20.0],
            physical: [3.0, 0.0],
            is_checkpoint: true,
        };
        let mut p = DeliveryPath::new(vec![a, b]);
        p.discretize(2.0).unwrap();
        let mid = p.points()[1];
        assert_eq!(mid.pixel_screen, [2.0, 4.0]);
        assert_eq!(mid.pixel_native, [20.0, 20.0]);
        assert_eq!(mid.physical, [1.5, 0.0]);
        assert!(!mid.is_checkpoint);
    }

    #[test]
    fn random_paths_converge_and_keep_checkpoints() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let n = rng.gen_range(1..8);
            let pts: Vec<[f64; 2]> = (0..n)
                .map(|_| [rng.gen_range(-25.0..25.0), rng.gen_range(-25.0..25.0)])
                .collect();
            let d = rng.gen_range(0.3..5.0);
            let mut p = path(&pts);
            let before = p.total_distance();
            p.discretize(d).unwrap();

            for w in p.points().windows(2) {
                assert!(distance(w[0].physical, w[1].physical) <= d);
            }
            let kept: Vec<[f64; 2]> = p.checkpoints().map(|q| q.physical).collect();
            assert_eq!(kept, pts);
            assert_abs_diff_eq!(p.total_distance(), before, epsilon = 1e-9);
        }
    }

    #[test]
    fn rejects_invalid_input() {
        let mut empty = DeliveryPath::default();
        assert!(matches!(empty.discretize(1.0), Err(PathError::Empty)));
        let mut p = path(&[[0.0, 0.0], [1.0, 1.0]]);
        assert!(matches!(p.discretize(0.0), Err(PathError::NonPositiveInterpolation(_))));
        assert!(matches!(p.discretize(f64::NAN), Err(PathError::NonPositiveInterpolation(_))));
        let mut bad = path(&[[0.0, 0.0], [f64::INFINITY, 1.0]]);
        assert!(matches!(bad.discretize(1.0), Err(PathError::NonFinitePoint { index: 1 })));

        assert!(matches!(validate_path_params(0, 1.0, 1.0), Err(PathError::Empty)));
        assert!(matches!(
            validate_path_params(2, -0.1, 1.0),
            Err(PathError::NonPositiveTolerance(_))
        ));
        assert!(validate_path_params(2, 0.5, 2.0).is_ok());
    }

    #[test]
    fn resumes_from_checkpoint() {
        let mut p = path(&[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]]);
        p.discretize(1.0).unwrap();
        let tail = p.from_checkpoint(1);
        assert_eq!(tail.physical_points(), vec![[4.0, 0.0], [4.0, 4.0]]);
        assert_abs_diff_eq!(path(&[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]]).total_distance(), 8.0);
    }

    #[test]
    fn checkpoints_carry_pixel_coordinates() {
        let coils = CoilSet {
            plus_x: [180.0, 100.0],
            minus_x: [20.0, 100.0],
            plus_y: [100.0, 20.0],
            minus_y: [100.0, 180.0],
        };
        let snap = CalibrationSnapshot::from_coil_pixels(coils, [200, 200], 53.0).unwrap();
        let p = DeliveryPath::from_physical_checkpoints(&[[0.0, 0.0], [10.0, 5.0]], &snap, 2.0);
        let origin = p.points()[0];
        assert_abs_diff_eq!(origin.pixel_native[0], 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(origin.pixel_native[1], 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(origin.pixel_screen[0], 200.0, epsilon = 1e-9);
        let back = snap.map_to_physical(p.points()[1].pixel_native);
        assert_abs_diff_eq!(back[0], 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(back[1], 5.0, epsilon = 1e-9);
    }
}
