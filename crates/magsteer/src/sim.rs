//! Simulated rig: a rendered camera view plus motor controllers that move a
//! virtual particle.
//!
//! The view is a light field with the four coil markers mounted upright
//! around the frame centre and a dark particle disc. A coil pulse pulls the
//! particle toward that coil by `motion_per_scale_ms × (scale − friction) ×
//! duration`, never past the coil itself. Time comes from a shared
//! [`SimulatedClock`], so pulses cost no wall time.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use image::{GrayImage, Luma};

use crate::calibration::CalibrationConfig;
use crate::coil::{Axis, Coil, CoilSet};
use crate::fiducial::MarkerDictionary;
use crate::geometry::distance;
use crate::hardware::{Clock, MotorChannel, MotorOutput, SimulatedClock};
use crate::operation::FrameSource;

/// Render a 6×6-cell marker: dark one-cell border, 4×4 payload read
/// row-major from the most significant bit, white = 1.
///
/// `angle` rotates the marker about `center` in image coordinates.
pub fn render_marker(img: &mut GrayImage, code: u16, center: [f64; 2], side: f64, angle: f64) {
    let cell = side / 6.0;
    let (s, c) = angle.sin_cos();
    let (w, h) = img.dimensions();
    let x0 = (center[0] - side).floor().max(0.0) as u32;
    let y0 = (center[1] - side).floor().max(0.0) as u32;
    let x1 = ((center[0] + side).ceil().max(0.0) as u32).min(w);
    let y1 = ((center[1] + side).ceil().max(0.0) as u32).min(h);

    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f64 - center[0];
            let dy = y as f64 - center[1];
            let u = (dx * c + dy * s) / cell + 3.0;
            let v = (-dx * s + dy * c) / cell + 3.0;
            if !(0.0..6.0).contains(&u) || !(0.0..6.0).contains(&v) {
                continue;
            }
            let (col, row) = (u as usize, v as usize);
            let white = if row == 0 || col == 0 || row == 5 || col == 5 {
                false
            } else {
                (code >> (15 - ((row - 1) * 4 + (col - 1)))) & 1 == 1
            };
            img.put_pixel(x, y, Luma([if white { 255 } else { 0 }]));
        }
    }
}

/// Fill a disc of `radius` around `center` with `value`.
pub fn render_disc(img: &mut GrayImage, center: [f64; 2], radius: f64, value: u8) {
    let (w, h) = img.dimensions();
    let x0 = (center[0] - radius).floor().max(0.0) as u32;
    let y0 = (center[1] - radius).floor().max(0.0) as u32;
    let x1 = ((center[0] + radius).ceil().max(-1.0) + 1.0) as u32;
    let y1 = ((center[1] + radius).ceil().max(-1.0) + 1.0) as u32;
    for y in y0..y1.min(h) {
        for x in x0..x1.min(w) {
            let dx = x as f64 - center[0];
            let dy = y as f64 - center[1];
            if dx * dx + dy * dy <= radius * radius {
                img.put_pixel(x, y, Luma([value]));
            }
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimRigConfig {
    pub frame_size: [u32; 2],
    /// Pixel distance from the frame centre to each marker centre.
    pub marker_offset_px: f64,
    pub marker_side_px: f64,
    pub particle_radius_px: f64,
    pub background_level: u8,
    pub particle_level: u8,
    /// Physical distance between the +Y and −Y landmarks.
    pub coil_spacing: f64,
    /// Physical travel per unit of scale per millisecond of pulse.
    pub motion_per_scale_ms: f64,
    /// Scale that only overcomes static friction.
    pub friction_scale: u8,
    pub marker_ids: CoilSet<u32>,
}

impl SimRigConfig {
    pub const DEFAULT_FRAME_SIZE: [u32; 2] = [400, 400];
    pub const DEFAULT_MARKER_OFFSET_PX: f64 = 150.0;
    pub const DEFAULT_MARKER_SIDE_PX: f64 = 36.0;
    pub const DEFAULT_PARTICLE_RADIUS_PX: f64 = 3.0;
    pub const DEFAULT_BACKGROUND_LEVEL: u8 = 210;
    pub const DEFAULT_PARTICLE_LEVEL: u8 = 20;
    pub const DEFAULT_MOTION_PER_SCALE_MS: f64 = 0.0004;
    pub const DEFAULT_FRICTION_SCALE: u8 = 4;

    /// Physical units per pixel of the rendered view.
    pub fn distance_per_pixel(&self) -> f64 {
        let landmark_offset = self.marker_offset_px - 0.5 * self.marker_side_px;
        self.coil_spacing / (2.0 * landmark_offset)
    }

    fn center_px(&self) -> [f64; 2] {
        [0.5 * self.frame_size[0] as f64, 0.5 * self.frame_size[1] as f64]
    }

    /// Physical (y-up, centred) → frame pixel.
    pub fn physical_to_pixel(&self, p: [f64; 2]) -> [f64; 2] {
        let c = self.center_px();
        let dpp = self.distance_per_pixel();
        [c[0] + p[0] / dpp, c[1] - p[1] / dpp]
    }

    /// Physical location of each coil landmark.
    pub fn coil_locations(&self) -> CoilSet<[f64; 2]> {
        let half = 0.5 * self.coil_spacing;
        CoilSet {
            plus_x: [half, 0.0],
            minus_x: [-half, 0.0],
            plus_y: [0.0, half],
            minus_y: [0.0, -half],
        }
    }
}

impl Default for SimRigConfig {
    fn default() -> Self {
        Self {
            frame_size: Self::DEFAULT_FRAME_SIZE,
            marker_offset_px: Self::DEFAULT_MARKER_OFFSET_PX,
            marker_side_px: Self::DEFAULT_MARKER_SIDE_PX,
            particle_radius_px: Self::DEFAULT_PARTICLE_RADIUS_PX,
            background_level: Self::DEFAULT_BACKGROUND_LEVEL,
            particle_level: Self::DEFAULT_PARTICLE_LEVEL,
            coil_spacing: CalibrationConfig::DEFAULT_COIL_SPACING_MM,
            motion_per_scale_ms: Self::DEFAULT_MOTION_PER_SCALE_MS,
            friction_scale: Self::DEFAULT_FRICTION_SCALE,
            marker_ids: CalibrationConfig::DEFAULT_MARKER_IDS,
        }
    }
}

#[derive(Debug)]
struct SimState {
    particle: [f64; 2],
    motors_available: bool,
}

/// Simulated camera and coil hardware sharing one particle.
#[derive(Debug, Clone)]
pub struct SimRig {
    config: Arc<SimRigConfig>,
    state: Arc<Mutex<SimState>>,
    clock: Arc<SimulatedClock>,
    scenery: Arc<GrayImage>,
}

impl SimRig {
    pub fn new(config: SimRigConfig, dictionary: &MarkerDictionary) -> Self {
        let scenery = render_scenery(&config, dictionary);
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(SimState {
                particle: [0.0, 0.0],
                motors_available: true,
            })),
            clock: Arc::new(SimulatedClock::new()),
            scenery: Arc::new(scenery),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &SimRigConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<SimulatedClock> {
        Arc::clone(&self.clock)
    }

    /// Particle position in rig physical coordinates.
    pub fn particle(&self) -> [f64; 2] {
        self.lock().particle
    }

    pub fn set_particle(&self, physical: [f64; 2]) {
        self.lock().particle = physical;
    }

    pub fn set_motors_available(&self, available: bool) {
        self.lock().motors_available = available;
    }

    /// View without the particle.
    pub fn scenery(&self) -> GrayImage {
        self.scenery.as_ref().clone()
    }

    /// Current camera view.
    pub fn render(&self) -> GrayImage {
        let mut img = self.scenery();
        let px = self.config.physical_to_pixel(self.particle());
        render_disc(
            &mut img,
            px,
            self.config.particle_radius_px,
            self.config.particle_level,
        );
        img
    }

    /// Motor controller handle for one axis.
    pub fn motor(&self, axis: Axis) -> SimMotor {
        SimMotor {
            axis,
            rig: self.clone(),
            pulse: None,
        }
    }

    fn apply_pulse(&self, coil: Coil, scale: u8, duration: Duration) {
        let cfg = &self.config;
        let effective = scale.saturating_sub(cfg.friction_scale) as f64;
        let travel = cfg.motion_per_scale_ms * effective * duration.as_secs_f64() * 1000.0;
        if travel <= 0.0 {
            return;
        }
        let target = cfg.coil_locations()[coil];
        let mut state = self.lock();
        let p = state.particle;
        let gap = distance(p, target);
        if gap <= f64::EPSILON {
            return;
        }
        let step = travel.min(gap) / gap;
        state.particle = [p[0] + (target[0] - p[0]) * step, p[1] + (target[1] - p[1]) * step];
    }
}

impl FrameSource for SimRig {
    fn next_frame(&mut self) -> Option<GrayImage> {
        Some(self.render())
    }
}

fn render_scenery(config: &SimRigConfig, dictionary: &MarkerDictionary) -> GrayImage {
    let [w, h] = config.frame_size;
    let mut img = GrayImage::from_pixel(w, h, Luma([config.background_level]));
    let c = config.center_px();
    let o = config.marker_offset_px;
    let placements = [
        (Coil::PlusX, [c[0] + o, c[1]]),
        (Coil::MinusX, [c[0] - o, c[1]]),
        (Coil::PlusY, [c[0], c[1] - o]),
        (Coil::MinusY, [c[0], c[1] + o]),
    ];
    for (coil, at) in placements {
        match dictionary.code(config.marker_ids[coil]) {
            Some(code) => render_marker(&mut img, code, at, config.marker_side_px, 0.0),
            None => tracing::warn!("marker id {} for {} is not in the dictionary", config.marker_ids[coil], coil),
        }
    }
    img
}

/// Simulated motor controller for one axis of a [`SimRig`].
#[derive(Debug)]
pub struct SimMotor {
    axis: Axis,
    rig: SimRig,
    pulse: Option<(MotorOutput, u8, Duration)>,
}

impl SimMotor {
    fn coil(&self, output: MotorOutput) -> Coil {
        let (plus, minus) = self.axis.coils();
        match output {
            MotorOutput::M1 => plus,
            MotorOutput::M2 => minus,
        }
    }

    fn finish_pulse(&mut self) {
        if let Some((output, scale, started)) = self.pulse.take() {
            let held = self.rig.clock.elapsed().saturating_sub(started);
            self.rig.apply_pulse(self.coil(output), scale, held);
        }
    }
}

impl MotorChannel for SimMotor {
    fn is_available(&self) -> bool {
        self.rig.lock().motors_available
    }

    fn forward(&mut self, output: MotorOutput, scale: u8) -> bool {
        if !self.is_available() {
            return false;
        }
        self.finish_pulse();
        if scale > 0 {
            self.pulse = Some((output, scale, self.rig.clock.elapsed()));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::ActuationCommand;
    use crate::calibration::{CalibrationConfig, CoordinateCalibrator};
    use crate::hardware::HardwareDispatcher;
    use approx::assert_abs_diff_eq;

    fn rig() -> SimRig {
        SimRig::new(SimRigConfig::default(), &MarkerDictionary::default())
    }

    #[test]
    fn pulse_pulls_particle_toward_coil() {
        let rig = rig();
        let mut dispatcher = HardwareDispatcher::new(
            Box::new(rig.motor(Axis::X)),
            Box::new(rig.motor(Axis::Y)),
        );
        let clock = rig.clock();
        dispatcher
            .dispatch(&ActuationCommand::single(Coil::PlusX, 29, 100), clock.as_ref())
            .unwrap();
        // 0.0004 × (29 − 4) × 100
        assert_abs_diff_eq!(rig.particle()[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rig.particle()[1], 0.0, epsilon = 1e-12);
        assert_eq!(clock.elapsed(), Duration::from_millis(100));

        // below friction: no motion
        dispatcher
            .dispatch(&ActuationCommand::single(Coil::MinusY, 4, 100), clock.as_ref())
            .unwrap();
        assert_abs_diff_eq!(rig.particle()[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn never_moves_past_the_coil() {
        let rig = rig();
        let mut m = rig.motor(Axis::Y);
        m.forward(MotorOutput::M2, 255);
        rig.clock().advance(Duration::from_secs(10));
        m.forward(MotorOutput::M2, 0);
        assert_abs_diff_eq!(rig.particle()[1], -26.5, epsilon = 1e-9);
    }

    #[test]
    fn unavailable_motors_refuse_commands() {
        let rig = rig();
        rig.set_motors_available(false);
        let mut m = rig.motor(Axis::X);
        assert!(!m.is_available());
        assert!(!m.forward(MotorOutput::M1, 50));
    }

    #[test]
    fn rendered_rig_calibrates_to_its_own_frame() {
        let rig = rig();
        let mut cal = CoordinateCalibrator::new(CalibrationConfig {
            sample_limit: 2,
            ..CalibrationConfig::default()
        });
        cal.sample_frame(&rig.render()).unwrap();
        cal.sample_frame(&rig.render()).unwrap();
        let snap = cal.snapshot().unwrap();

        assert_abs_diff_eq!(snap.distance_per_pixel(), rig.config().distance_per_pixel(), epsilon = 2e-3);
        let p = [3.0, -4.5];
        let seen = snap.map_to_physical(rig.config().physical_to_pixel(p));
        assert_abs_diff_eq!(seen[0], p[0], epsilon = 0.15);
        assert_abs_diff_eq!(seen[1], p[1], epsilon = 0.15);
    }
}
