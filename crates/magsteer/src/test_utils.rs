//! Shared synthetic-image helpers for unit tests.

use image::{GrayImage, Luma};

use crate::fiducial::MarkerDictionary;
use crate::sim::{render_disc, render_marker};

/// Image position of canonical marker corner `k` (0 = TL, clockwise) for a
/// marker rendered by [`draw_marker`].
pub(crate) fn marker_corner(center: [f64; 2], side: f64, angle: f64, k: usize) -> [f64; 2] {
    let half = 0.5 * side;
    let local = [[-half, -half], [half, -half], [half, half], [-half, half]][k % 4];
    let (s, c) = angle.sin_cos();
    [
        center[0] + local[0] * c - local[1] * s,
        center[1] + local[0] * s + local[1] * c,
    ]
}

pub(crate) fn draw_marker(img: &mut GrayImage, code: u16, center: [f64; 2], side: f64, angle: f64) {
    render_marker(img, code, center, side, angle);
}

pub(crate) fn draw_disc(img: &mut GrayImage, center: [f64; 2], radius: f64, value: u8) {
    render_disc(img, center, radius, value);
}

/// Light frame with the four coil markers mounted upright around `center`,
/// each `offset` pixels from it.
pub(crate) fn draw_rig(size: [u32; 2], center: [f64; 2], offset: f64, marker_side: f64) -> GrayImage {
    let dict = MarkerDictionary::default();
    let mut img = GrayImage::from_pixel(size[0], size[1], Luma([210u8]));
    let placements = [
        (10, [center[0] + offset, center[1]]),
        (17, [center[0] - offset, center[1]]),
        (34, [center[0], center[1] - offset]),
        (37, [center[0], center[1] + offset]),
    ];
    for (id, at) in placements {
        if let Some(code) = dict.code(id) {
            render_marker(&mut img, code, at, marker_side, 0.0);
        }
    }
    img
}
