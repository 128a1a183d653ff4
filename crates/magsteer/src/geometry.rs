//! Planar geometry helpers shared by calibration, localization and planning.
//!
//! Points are plain `[f64; 2]`. The frame (image pixels, screen pixels or
//! physical millimetres) is whatever the caller works in.

/// Below this magnitude a 2×2 determinant is treated as singular.
const PARALLEL_EPS: f64 = 1e-9;

/// Euclidean distance between two points.
#[inline]
pub fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

/// Exact midpoint of two points.
#[inline]
pub fn midpoint(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [0.5 * (a[0] + b[0]), 0.5 * (a[1] + b[1])]
}

/// Intersection of the infinite line through `p0, p1` with the line through
/// `q0, q1`.
///
/// Each line is written as `a·x + b·y = c` and the 2×2 system is solved by
/// Cramer's rule. Returns `None` when the lines are parallel (or either line
/// is degenerate).
pub fn line_intersection(
    p0: [f64; 2],
    p1: [f64; 2],
    q0: [f64; 2],
    q1: [f64; 2],
) -> Option<[f64; 2]> {
    let a1 = p1[1] - p0[1];
    let b1 = p0[0] - p1[0];
    let c1 = a1 * p0[0] + b1 * p0[1];

    let a2 = q1[1] - q0[1];
    let b2 = q0[0] - q1[0];
    let c2 = a2 * q0[0] + b2 * q0[1];

    let det = a1 * b2 - a2 * b1;
    if det.abs() < PARALLEL_EPS {
        return None;
    }
    Some([(b2 * c1 - b1 * c2) / det, (a1 * c2 - a2 * c1) / det])
}

/// Signed shoelace area of a closed polygon.
///
/// In image coordinates (y down) a visually clockwise polygon has positive
/// area.
pub fn signed_area(points: &[[f64; 2]]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        acc += p[0] * q[1] - q[0] * p[1];
    }
    0.5 * acc
}

/// Axis-aligned integer rectangle in image pixels (`x..x+width`, `y..y+height`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Bounding box of `points`, clamped to an image of size `image_size`.
    ///
    /// Returns `None` if the clamped box is empty.
    pub fn bounding(points: &[[f64; 2]], image_size: [u32; 2]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut max_x) = (first[0], first[0]);
        let (mut min_y, mut max_y) = (first[1], first[1]);
        for p in &points[1..] {
            min_x = min_x.min(p[0]);
            max_x = max_x.max(p[0]);
            min_y = min_y.min(p[1]);
            max_y = max_y.max(p[1]);
        }
        if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
            return None;
        }

        let x0 = min_x.floor().clamp(0.0, image_size[0] as f64) as u32;
        let y0 = min_y.floor().clamp(0.0, image_size[1] as f64) as u32;
        let x1 = max_x.ceil().clamp(0.0, image_size[0] as f64) as u32;
        let y1 = max_y.ceil().clamp(0.0, image_size[1] as f64) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    /// Rectangle covering a whole image.
    pub fn full(image_size: [u32; 2]) -> Self {
        Self {
            x: 0,
            y: 0,
            width: image_size[0],
            height: image_size[1],
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Top-left corner as a floating point offset.
    pub fn origin(&self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }

    /// Whether the rectangle lies entirely inside an image of `image_size`.
    pub fn fits_within(&self, image_size: [u32; 2]) -> bool {
        self.x as u64 + self.width as u64 <= image_size[0] as u64
            && self.y as u64 + self.height as u64 <= image_size[1] as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn perpendicular_lines_meet_at_crossing() {
        let p = line_intersection([0.0, 5.0], [10.0, 5.0], [3.0, 0.0], [3.0, 10.0]).unwrap();
        assert_abs_diff_eq!(p[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn oblique_lines_meet_at_crossing() {
        // y = x and y = -x + 4 cross at (2, 2)
        let p = line_intersection([0.0, 0.0], [4.0, 4.0], [0.0, 4.0], [4.0, 0.0]).unwrap();
        assert_abs_diff_eq!(p[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn parallel_lines_have_no_intersection() {
        assert!(line_intersection([0.0, 0.0], [10.0, 0.0], [0.0, 3.0], [10.0, 3.0]).is_none());
        // degenerate line (both points equal)
        assert!(line_intersection([1.0, 1.0], [1.0, 1.0], [0.0, 3.0], [10.0, 3.0]).is_none());
    }

    #[test]
    fn clockwise_in_image_coordinates_is_positive() {
        let cw = [[0.0, 0.0], [4.0, 0.0], [4.0, 2.0], [0.0, 2.0]];
        assert_abs_diff_eq!(signed_area(&cw), 8.0, epsilon = 1e-12);
        let mut ccw = cw;
        ccw.reverse();
        assert_abs_diff_eq!(signed_area(&ccw), -8.0, epsilon = 1e-12);
    }

    #[test]
    fn bounding_rect_is_clamped_to_image() {
        let r = PixelRect::bounding(&[[-5.0, 10.2], [50.5, 20.0], [30.0, 99.0]], [40, 60]).unwrap();
        assert_eq!(
            r,
            PixelRect {
                x: 0,
                y: 10,
                width: 40,
                height: 50
            }
        );
        assert!(r.fits_within([40, 60]));
        assert!(PixelRect::bounding(&[[3.0, 3.0]], [40, 60]).is_none());
    }
}
