//! Marker-grid to image homography.
//!
//! Four-point DLT: grid square and image quad are both Hartley-normalized
//! (centroid at the origin, mean radius √2), the 8×9 design matrix is
//! assembled, and H is the eigenvector of AᵀA with the smallest eigenvalue.

use nalgebra::{Matrix3, SMatrix, SymmetricEigen, Vector3};

/// Maps canonical grid coordinates (`0..side` on both axes, y down) onto a
/// detected image quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GridHomography {
    h: Matrix3<f64>,
}

impl GridHomography {
    /// Fit the homography taking the `side × side` grid square onto `quad`
    /// (corners TL, TR, BR, BL). `None` for a degenerate quad.
    pub(crate) fn fit(side: f64, quad: &[[f64; 2]; 4]) -> Option<Self> {
        let square = [[0.0, 0.0], [side, 0.0], [side, side], [0.0, side]];
        let (t_grid, grid) = hartley(&square)?;
        let (t_img, img) = hartley(quad)?;

        let mut a = SMatrix::<f64, 8, 9>::zeros();
        for (k, (g, p)) in grid.iter().zip(&img).enumerate() {
            let (u, v) = (g[0], g[1]);
            let (x, y) = (p[0], p[1]);
            a.row_mut(2 * k)
                .copy_from_slice(&[0.0, 0.0, 0.0, -u, -v, -1.0, y * u, y * v, y]);
            a.row_mut(2 * k + 1)
                .copy_from_slice(&[u, v, 1.0, 0.0, 0.0, 0.0, -x * u, -x * v, -x]);
        }

        let eig = SymmetricEigen::new(a.transpose() * a);
        let (null_idx, _) = eig
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|l, r| l.1.abs().total_cmp(&r.1.abs()))?;
        let n = eig.eigenvectors.column(null_idx);
        let h_norm = Matrix3::from_fn(|r, c| n[3 * r + c]);

        let h = t_img.try_inverse()? * h_norm * t_grid;
        let w = h[(2, 2)];
        if !w.is_finite() || w.abs() < 1e-12 {
            return None;
        }
        Some(Self { h: h / w })
    }

    /// Image position of grid point `(u, v)`; `None` at the horizon.
    pub(crate) fn map(&self, u: f64, v: f64) -> Option<[f64; 2]> {
        let p = self.h * Vector3::new(u, v, 1.0);
        if p.z.abs() < 1e-12 {
            return None;
        }
        let out = [p.x / p.z, p.y / p.z];
        (out[0].is_finite() && out[1].is_finite()).then_some(out)
    }
}

/// Similarity moving the centroid to the origin with mean radius √2, and
/// the transformed points.
fn hartley(pts: &[[f64; 2]; 4]) -> Option<(Matrix3<f64>, [[f64; 2]; 4])> {
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / 4.0;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / 4.0;
    let spread = pts.iter().map(|p| (p[0] - cx).hypot(p[1] - cy)).sum::<f64>() / 4.0;
    if !(spread > 1e-9) {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / spread;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    Some((t, pts.map(|p| [s * (p[0] - cx), s * (p[1] - cy)])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn grid_corners_land_on_perspective_quad() {
        let quad = [[100.0, 50.0], [180.0, 60.0], [170.0, 150.0], [95.0, 130.0]];
        let h = GridHomography::fit(6.0, &quad).unwrap();
        let grid = [[0.0, 0.0], [6.0, 0.0], [6.0, 6.0], [0.0, 6.0]];
        for (g, q) in grid.iter().zip(&quad) {
            let p = h.map(g[0], g[1]).unwrap();
            assert_abs_diff_eq!(p[0], q[0], epsilon = 1e-6);
            assert_abs_diff_eq!(p[1], q[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn axis_aligned_square_is_affine() {
        let quad = [[10.0, 20.0], [40.0, 20.0], [40.0, 50.0], [10.0, 50.0]];
        let h = GridHomography::fit(6.0, &quad).unwrap();
        let centre = h.map(3.0, 3.0).unwrap();
        assert_abs_diff_eq!(centre[0], 25.0, epsilon = 1e-6);
        assert_abs_diff_eq!(centre[1], 35.0, epsilon = 1e-6);
        // each grid cell is 5 px
        let cell = h.map(1.0, 0.0).unwrap();
        assert_abs_diff_eq!(cell[0], 15.0, epsilon = 1e-6);
    }

    #[test]
    fn collapsed_quad_is_rejected() {
        assert!(GridHomography::fit(6.0, &[[5.0, 5.0]; 4]).is_none());
    }
}
