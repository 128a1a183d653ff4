//! Per-coil hardware command set.

use crate::coil::{Axis, Coil, CoilSet};

/// Current scale and activation time for one coil. Zero scale means the coil
/// stays off this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct CoilCommand {
    pub scale: u8,
    pub duration_ms: u32,
}

impl CoilCommand {
    pub const OFF: CoilCommand = CoilCommand {
        scale: 0,
        duration_ms: 0,
    };

    pub fn is_active(&self) -> bool {
        self.scale != 0
    }
}

/// Commands for all four coils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ActuationCommand {
    pub coils: CoilSet<CoilCommand>,
}

impl ActuationCommand {
    /// Every coil off.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Fire a single coil.
    pub fn single(coil: Coil, scale: u8, duration_ms: u32) -> Self {
        let mut cmd = Self::idle();
        cmd.coils[coil] = CoilCommand { scale, duration_ms };
        cmd
    }

    pub fn is_idle(&self) -> bool {
        self.coils.iter().all(|(_, c)| !c.is_active())
    }

    /// `(plus, minus)` commands of one axis.
    pub fn axis(&self, axis: Axis) -> (CoilCommand, CoilCommand) {
        let (plus, minus) = axis.coils();
        (self.coils[plus], self.coils[minus])
    }

    /// Flat `[scale, duration]` pairs in +X, −X, +Y, −Y order.
    pub fn to_fields(&self) -> [u32; 8] {
        let mut out = [0u32; 8];
        for (coil, c) in self.coils.iter() {
            out[2 * coil.index()] = c.scale as u32;
            out[2 * coil.index() + 1] = c.duration_ms;
        }
        out
    }
}
