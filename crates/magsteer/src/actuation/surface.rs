//! Cubic surface-fit actuation model.
//!
//! Per coil, the scale is a fitted cubic in the absolute travel `d` and the
//! distance to the coil `r`:
//!
//! `s = c0 + c1·d + c2·r + c3·d² + c4·d·r + c5·r² + c6·d²·r + c7·d·r² + c8·r³`

use super::{ActuationModel, CoilQuery, CommandLimits};
use crate::coil::{Coil, CoilSet};

type Coefficients = [f64; 9];

const SURFACE_COEFFICIENTS: CoilSet<Coefficients> = CoilSet {
    plus_x: [
        816.3325, -105.8183, -82.3793, 4.8661, 7.33645, 2.6562, -0.2251, -0.1055, -0.0268,
    ],
    minus_x: [
        1630.9, -288.0743, -157.4598, 14.2526, 18.9574, 4.8963, -0.6053, -0.2767, -0.0486,
    ],
    plus_y: [
        1930.5, -296.6075, -190.1963, 13.8199, 19.5185, 6.0726, -0.585, -0.2850, -0.0624,
    ],
    minus_y: [
        720.8288, -70.6802, -73.2834, 4.3349, 4.7419, 2.3785, -0.2030, -0.0578, -0.0241,
    ],
};

fn eval_surface(c: &Coefficients, d: f64, r: f64) -> f64 {
    c[0] + c[1] * d
        + c[2] * r
        + c[3] * d * d
        + c[4] * d * r
        + c[5] * r * r
        + c[6] * d * d * r
        + c[7] * d * r * r
        + c[8] * r * r * r
}

#[derive(Debug, Clone)]
pub struct SurfaceFitModel {
    coefficients: CoilSet<Coefficients>,
    limits: CommandLimits,
}

impl SurfaceFitModel {
    pub fn new(limits: CommandLimits) -> Self {
        Self {
            coefficients: SURFACE_COEFFICIENTS,
            limits,
        }
    }

    /// Scale estimate for `coil` at travel `d` and coil distance `r`.
    pub fn surface(&self, coil: Coil, d: f64, r: f64) -> f64 {
        eval_surface(&self.coefficients[coil], d, r)
    }
}

impl ActuationModel for SurfaceFitModel {
    fn name(&self) -> &'static str {
        "surface_fit"
    }

    fn limits(&self) -> CommandLimits {
        self.limits
    }

    fn raw_scale(&self, q: &CoilQuery) -> f64 {
        self.surface(q.coil, q.travel, q.distance_to_coil)
    }
}
