//! Stagnation boost: extra current for an axis that is not moving.
//!
//! Static friction keeps a particle in place below some field strength that
//! the actuation models do not capture. While an axis still needs substantial
//! travel but the particle barely moved along it since the previous tick, the
//! boost for that axis grows by a fixed increment every tick. It drops back to
//! zero as soon as either condition stops holding.

use crate::coil::{Axis, BoostDirection, Coil};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    /// Minimum remaining travel on an axis for the boost to accumulate.
    pub stagnation_travel: f64,
    /// Maximum motion on an axis since the previous tick that counts as stuck.
    pub stagnation_motion: f64,
    /// Motion below which the particle counts as completely still.
    pub still_motion: f64,
    /// Travel on both axes above which a still particle gets the forced boost.
    pub still_travel: f64,
    pub increment: u32,
    pub forced: u32,
}

impl BoostConfig {
    pub const DEFAULT_STAGNATION_TRAVEL: f64 = 1.5;
    pub const DEFAULT_STAGNATION_MOTION: f64 = 0.2;
    pub const DEFAULT_STILL_MOTION: f64 = 0.1;
    pub const DEFAULT_STILL_TRAVEL: f64 = 0.5;
    pub const DEFAULT_INCREMENT: u32 = 3;
    pub const DEFAULT_FORCED: u32 = 3;
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            stagnation_travel: Self::DEFAULT_STAGNATION_TRAVEL,
            stagnation_motion: Self::DEFAULT_STAGNATION_MOTION,
            still_motion: Self::DEFAULT_STILL_MOTION,
            still_travel: Self::DEFAULT_STILL_TRAVEL,
            increment: Self::DEFAULT_INCREMENT,
            forced: Self::DEFAULT_FORCED,
        }
    }
}

pub(crate) fn validate_boost_config(cfg: &BoostConfig) -> Result<(), String> {
    let thresholds = [
        ("stagnation_travel", cfg.stagnation_travel),
        ("stagnation_motion", cfg.stagnation_motion),
        ("still_motion", cfg.still_motion),
        ("still_travel", cfg.still_travel),
    ];
    for (name, v) in thresholds {
        if !v.is_finite() || v < 0.0 {
            return Err(format!("actuation.boost.{} must be finite and >= 0", name));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct AxisBoost {
    amount: u32,
    direction: BoostDirection,
}

/// Boost state carried across ticks of one operation.
#[derive(Debug, Clone)]
pub struct StagnationBoost {
    config: BoostConfig,
    previous: Option<[f64; 2]>,
    x: AxisBoost,
    y: AxisBoost,
}

impl StagnationBoost {
    pub fn new(config: BoostConfig) -> Self {
        Self {
            config,
            previous: None,
            x: AxisBoost::default(),
            y: AxisBoost::default(),
        }
    }

    pub fn config(&self) -> &BoostConfig {
        &self.config
    }

    /// Update the boost from the particle's position and the current target.
    ///
    /// The first call after construction or [`reset`](Self::reset) only
    /// records the position.
    pub fn update(&mut self, current: [f64; 2], target: [f64; 2]) {
        let Some(previous) = self.previous.replace(current) else {
            self.x = AxisBoost::default();
            self.y = AxisBoost::default();
            return;
        };

        let cfg = &self.config;
        let moved = [
            (current[0] - previous[0]).abs(),
            (current[1] - previous[1]).abs(),
        ];
        let travel = [target[0] - current[0], target[1] - current[1]];

        for (axis, state) in [(Axis::X, &mut self.x), (Axis::Y, &mut self.y)] {
            let i = axis_index(axis);
            if travel[i].abs() >= cfg.stagnation_travel && moved[i] <= cfg.stagnation_motion {
                state.amount = state.amount.saturating_add(cfg.increment);
                state.direction = BoostDirection::from_travel(travel[i]);
            } else {
                *state = AxisBoost::default();
            }
        }

        let still = moved.iter().all(|&m| m <= cfg.still_motion);
        let far = travel.iter().all(|t| t.abs() >= cfg.still_travel);
        if still && far {
            self.x = AxisBoost {
                amount: cfg.forced,
                direction: BoostDirection::from_travel(travel[0]),
            };
            self.y = AxisBoost {
                amount: cfg.forced,
                direction: BoostDirection::from_travel(travel[1]),
            };
        }

        if self.x.amount > 0 || self.y.amount > 0 {
            tracing::debug!(
                "boost x={} ({:?}) y={} ({:?})",
                self.x.amount,
                self.x.direction,
                self.y.amount,
                self.y.direction
            );
        }
    }

    pub fn amount(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.x.amount,
            Axis::Y => self.y.amount,
        }
    }

    pub fn direction(&self, axis: Axis) -> BoostDirection {
        match axis {
            Axis::X => self.x.direction,
            Axis::Y => self.y.direction,
        }
    }

    /// Extra current scale for `coil` this tick.
    pub fn bonus_for(&self, coil: Coil) -> u32 {
        let axis = coil.axis();
        if self.direction(axis).applies_to(coil) {
            self.amount(axis)
        } else {
            0
        }
    }

    /// Forget the previous position and all accumulated boost.
    pub fn reset(&mut self) {
        self.previous = None;
        self.x = AxisBoost::default();
        self.y = AxisBoost::default();
    }
}

impl Default for StagnationBoost {
    fn default() -> Self {
        Self::new(BoostConfig::default())
    }
}

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
    }
}
