//! Quad candidate extraction and payload decoding.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

use super::dictionary::{MarkerDictionary, PAYLOAD_SIDE};
use super::homography::GridHomography;
use super::{DetectedMarker, MarkerDetectConfig};
use crate::geometry::{distance, signed_area};

/// Grid side in cells: payload plus a one-cell border on each side.
const GRID_SIDE: usize = PAYLOAD_SIDE + 2;

/// Sub-sample offsets inside a cell (fractions of a cell around its center).
const CELL_SUBSAMPLES: [f64; 3] = [-0.25, 0.0, 0.25];

/// Binarize with dark pixels as foreground (markers are printed black).
pub(super) fn binarize_dark(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= level {
            image::Luma([255u8])
        } else {
            image::Luma([0u8])
        }
    })
}

/// Convex quadrilaterals traced from the outer borders of dark regions.
pub(super) fn quad_candidates(binary: &GrayImage, cfg: &MarkerDetectConfig) -> Vec<[[f64; 2]; 4]> {
    let contours = find_contours::<i32>(binary);
    let mut quads = Vec::new();

    for contour in contours {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let pts: Vec<[f64; 2]> = contour.points.iter().map(to_f64).collect();
        let perimeter = imageproc::geometry::arc_length(&contour.points, true);
        if perimeter < cfg.min_perimeter_px {
            continue;
        }
        let tol = (cfg.quad_tolerance_ratio * perimeter).max(cfg.min_quad_tolerance_px);
        if let Some(q) = fit_quad(&pts, tol) {
            quads.push(q);
        }
    }
    quads
}

fn to_f64(p: &Point<i32>) -> [f64; 2] {
    [p.x as f64, p.y as f64]
}

/// Fit four extreme corners to a closed contour and accept the quad if every
/// contour point lies within `tol` of one of its edges.
///
/// Corners are returned clockwise in image coordinates.
fn fit_quad(pts: &[[f64; 2]], tol: f64) -> Option<[[f64; 2]; 4]> {
    if pts.len() < 4 {
        return None;
    }
    let n = pts.len() as f64;
    let centroid = [
        pts.iter().map(|p| p[0]).sum::<f64>() / n,
        pts.iter().map(|p| p[1]).sum::<f64>() / n,
    ];

    let c0 = farthest_from(pts, centroid)?;
    let c2 = farthest_from(pts, c0)?;

    // Extreme points on either side of the c0–c2 diagonal.
    let (dx, dy) = (c2[0] - c0[0], c2[1] - c0[1]);
    let side = |p: &[f64; 2]| dx * (p[1] - c0[1]) - dy * (p[0] - c0[0]);
    let c1 = *pts.iter().max_by(|a, b| side(a).total_cmp(&side(b)))?;
    let c3 = *pts.iter().min_by(|a, b| side(a).total_cmp(&side(b)))?;
    if side(&c1) <= 0.0 || side(&c3) >= 0.0 {
        return None;
    }

    let mut quad = [c0, c1, c2, c3];
    if signed_area(&quad) < 0.0 {
        quad.reverse();
    }
    if !is_convex(&quad) {
        return None;
    }

    let fits = pts
        .iter()
        .all(|p| (0..4).any(|i| segment_distance(*p, quad[i], quad[(i + 1) % 4]) <= tol));
    fits.then_some(quad)
}

fn farthest_from(pts: &[[f64; 2]], origin: [f64; 2]) -> Option<[f64; 2]> {
    pts.iter()
        .copied()
        .max_by(|a, b| distance(*a, origin).total_cmp(&distance(*b, origin)))
}

fn is_convex(quad: &[[f64; 2]; 4]) -> bool {
    (0..4).all(|i| {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        let c = quad[(i + 2) % 4];
        let cross = (b[0] - a[0]) * (c[1] - b[1]) - (b[1] - a[1]) * (c[0] - b[0]);
        cross > 0.0
    })
}

fn segment_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let (vx, vy) = (b[0] - a[0], b[1] - a[1]);
    let len2 = vx * vx + vy * vy;
    if len2 <= f64::EPSILON {
        return distance(p, a);
    }
    let t = (((p[0] - a[0]) * vx + (p[1] - a[1]) * vy) / len2).clamp(0.0, 1.0);
    distance(p, [a[0] + t * vx, a[1] + t * vy])
}

/// Mean intensity of every grid cell for a quad in canonical corner order.
fn sample_cells(gray: &GrayImage, quad: &[[f64; 2]; 4]) -> Option<[[f64; GRID_SIDE]; GRID_SIDE]> {
    let h = GridHomography::fit(GRID_SIDE as f64, quad)?;
    let (w, hgt) = gray.dimensions();
    let mut cells = [[0.0; GRID_SIDE]; GRID_SIDE];

    for (row, cells_row) in cells.iter_mut().enumerate() {
        for (col, cell) in cells_row.iter_mut().enumerate() {
            let mut acc = 0.0;
            let mut count = 0usize;
            for du in CELL_SUBSAMPLES {
                for dv in CELL_SUBSAMPLES {
                    let p = h.map(col as f64 + 0.5 + du, row as f64 + 0.5 + dv)?;
                    let x = p[0].round();
                    let y = p[1].round();
                    if x < 0.0 || y < 0.0 || x >= w as f64 || y >= hgt as f64 {
                        continue;
                    }
                    acc += gray.get_pixel(x as u32, y as u32)[0] as f64;
                    count += 1;
                }
            }
            if count == 0 {
                return None;
            }
            *cell = acc / count as f64;
        }
    }
    Some(cells)
}

fn is_border(row: usize, col: usize) -> bool {
    row == 0 || col == 0 || row == GRID_SIDE - 1 || col == GRID_SIDE - 1
}

/// Decode a clockwise quad, trying each of the four cyclic corner orderings.
///
/// On success the returned corners start at the marker's canonical top-left.
pub(super) fn decode_quad(
    gray: &GrayImage,
    quad: &[[f64; 2]; 4],
    dict: &MarkerDictionary,
    cfg: &MarkerDetectConfig,
) -> Option<DetectedMarker> {
    let mut best: Option<DetectedMarker> = None;

    for shift in 0..4 {
        let ordered = [
            quad[shift],
            quad[(shift + 1) % 4],
            quad[(shift + 2) % 4],
            quad[(shift + 3) % 4],
        ];
        let cells = sample_cells(gray, &ordered)?;

        let (lo, hi) = cells
            .iter()
            .flatten()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if hi - lo < cfg.min_cell_contrast {
            return None;
        }
        let mid = 0.5 * (lo + hi);

        let mut border_errors = 0u32;
        let mut word = 0u16;
        for (row, cells_row) in cells.iter().enumerate() {
            for (col, &v) in cells_row.iter().enumerate() {
                let white = v > mid;
                if is_border(row, col) {
                    border_errors += white as u32;
                } else {
                    word = (word << 1) | white as u16;
                }
            }
        }
        if border_errors > cfg.max_border_errors {
            // the border is orientation-independent
            return None;
        }

        if let Some(m) = dict.match_word(word) {
            if m.distance <= cfg.max_correction_bits
                && best.as_ref().map_or(true, |b| m.distance < b.bit_errors)
            {
                best = Some(DetectedMarker {
                    id: m.id,
                    corners: ordered,
                    bit_errors: m.distance,
                });
            }
        }
    }
    best
}
