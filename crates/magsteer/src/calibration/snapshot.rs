//! Immutable pixel↔physical coordinate frame derived from the coil markers.

use std::path::Path;

use crate::coil::{Coil, CoilSet};
use crate::geometry::{distance, line_intersection, PixelRect};

use super::CalibrationError;

const SNAPSHOT_SCHEMA_V1: &str = "magsteer.calibration.v1";

/// Result of a completed calibration.
///
/// Physical coordinates are centred on the intersection of the coil axes,
/// rotated by `axis_angle` and y-up. Units are those of the known coil
/// spacing (millimetres by default).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationSnapshot {
    origin_px: [f64; 2],
    axis_angle: f64,
    distance_per_pixel: f64,
    field_of_view: [f64; 2],
    roi: PixelRect,
    image_size: [u32; 2],
    coil_pixels: CoilSet<[f64; 2]>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SnapshotFileV1 {
    schema: String,
    #[serde(flatten)]
    snapshot: CalibrationSnapshot,
}

impl CalibrationSnapshot {
    /// Derive the coordinate frame from averaged coil landmark pixels.
    ///
    /// `coil_spacing` is the known physical distance between the +Y and −Y
    /// landmarks.
    pub fn from_coil_pixels(
        coil_pixels: CoilSet<[f64; 2]>,
        image_size: [u32; 2],
        coil_spacing: f64,
    ) -> Result<Self, CalibrationError> {
        let origin_px = line_intersection(
            coil_pixels[Coil::PlusX],
            coil_pixels[Coil::MinusX],
            coil_pixels[Coil::PlusY],
            coil_pixels[Coil::MinusY],
        )
        .ok_or(CalibrationError::ParallelAxes)?;

        let plus_x = coil_pixels[Coil::PlusX];
        let adjacent = (plus_x[0] - origin_px[0]).abs();
        let hypotenuse = distance(plus_x, origin_px);
        if hypotenuse <= f64::EPSILON {
            return Err(CalibrationError::DegenerateGeometry(
                "+X landmark coincides with the origin".into(),
            ));
        }
        // Unsigned: a clockwise-mounted rig reads back as counter-clockwise.
        let axis_angle = (adjacent / hypotenuse).clamp(-1.0, 1.0).acos();

        let y_span_px = distance(coil_pixels[Coil::PlusY], coil_pixels[Coil::MinusY]);
        if y_span_px <= f64::EPSILON {
            return Err(CalibrationError::DegenerateGeometry(
                "Y coil landmarks coincide".into(),
            ));
        }
        let distance_per_pixel = coil_spacing / y_span_px;
        let field_of_view = [
            image_size[0] as f64 * distance_per_pixel,
            image_size[1] as f64 * distance_per_pixel,
        ];

        let corners: Vec<[f64; 2]> = coil_pixels.iter().map(|(_, p)| *p).collect();
        let roi = PixelRect::bounding(&corners, image_size).ok_or_else(|| {
            CalibrationError::DegenerateGeometry("coil bounding rectangle is empty".into())
        })?;

        Ok(Self {
            origin_px,
            axis_angle,
            distance_per_pixel,
            field_of_view,
            roi,
            image_size,
            coil_pixels,
        })
    }

    /// Pixel → physical: rotate about the origin, flip y, scale.
    pub fn map_to_physical(&self, px: [f64; 2]) -> [f64; 2] {
        let (s, c) = self.axis_angle.sin_cos();
        let dx = px[0] - self.origin_px[0];
        let dy = self.origin_px[1] - px[1];
        [
            (dx * c + dy * s) * self.distance_per_pixel,
            (-dx * s + dy * c) * self.distance_per_pixel,
        ]
    }

    /// Physical → pixel. Exact inverse of [`Self::map_to_physical`].
    pub fn map_to_pixel(&self, physical: [f64; 2]) -> [f64; 2] {
        let (s, c) = self.axis_angle.sin_cos();
        let mx = physical[0] / self.distance_per_pixel;
        let my = physical[1] / self.distance_per_pixel;
        [
            self.origin_px[0] + mx * c - my * s,
            self.origin_px[1] - (mx * s + my * c),
        ]
    }

    pub fn coil_physical_locations(&self) -> CoilSet<[f64; 2]> {
        self.coil_pixels.map(|_, p| self.map_to_physical(*p))
    }

    pub fn coil_pixel_locations(&self) -> CoilSet<[f64; 2]> {
        self.coil_pixels
    }

    pub fn distance_per_pixel(&self) -> f64 {
        self.distance_per_pixel
    }

    /// Physical width and height covered by a full frame.
    pub fn field_of_view(&self) -> [f64; 2] {
        self.field_of_view
    }

    pub fn origin_px(&self) -> [f64; 2] {
        self.origin_px
    }

    /// Workspace rotation relative to the image horizontal (radians).
    pub fn axis_angle(&self) -> f64 {
        self.axis_angle
    }

    /// Pixel rectangle spanned by the four coil landmarks.
    pub fn roi(&self) -> PixelRect {
        self.roi
    }

    pub fn image_size(&self) -> [u32; 2] {
        self.image_size
    }

    /// Load a snapshot saved by [`Self::to_json_file`].
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let file: SnapshotFileV1 = serde_json::from_str(&data)?;
        if file.schema != SNAPSHOT_SCHEMA_V1 {
            return Err(format!(
                "unsupported calibration schema '{}' (expected '{}')",
                file.schema, SNAPSHOT_SCHEMA_V1
            )
            .into());
        }
        let s = file.snapshot;
        if !(s.distance_per_pixel.is_finite() && s.distance_per_pixel > 0.0) {
            return Err("distance_per_pixel must be finite and > 0".into());
        }
        Ok(s)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let file = SnapshotFileV1 {
            schema: SNAPSHOT_SCHEMA_V1.to_string(),
            snapshot: self.clone(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}
