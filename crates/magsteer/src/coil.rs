//! Coil identities and per-coil storage.
//!
//! The rig has four electromagnets, two per axis. A [`Coil`] is used both for
//! geometry (where is it, which axis does it pull along) and for selecting
//! per-coil model parameters and command slots.

use std::ops::{Index, IndexMut};

/// One of the four fixed electromagnets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coil {
    PlusX,
    MinusX,
    PlusY,
    MinusY,
}

impl Coil {
    /// All coils in canonical order (+X, −X, +Y, −Y).
    pub const ALL: [Coil; 4] = [Coil::PlusX, Coil::MinusX, Coil::PlusY, Coil::MinusY];

    pub fn index(self) -> usize {
        match self {
            Coil::PlusX => 0,
            Coil::MinusX => 1,
            Coil::PlusY => 2,
            Coil::MinusY => 3,
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            Coil::PlusX | Coil::MinusX => Axis::X,
            Coil::PlusY | Coil::MinusY => Axis::Y,
        }
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Coil::PlusX | Coil::PlusY)
    }

    pub fn label(self) -> &'static str {
        match self {
            Coil::PlusX => "+X",
            Coil::MinusX => "-X",
            Coil::PlusY => "+Y",
            Coil::MinusY => "-Y",
        }
    }

    /// Coil that pulls along `axis` in the direction of `travel`.
    ///
    /// Exactly zero travel selects no coil.
    pub fn for_travel(axis: Axis, travel: f64) -> Option<Coil> {
        let (plus, minus) = axis.coils();
        if travel > 0.0 {
            Some(plus)
        } else if travel < 0.0 {
            Some(minus)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Coil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical axis of the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];

    /// `(positive, negative)` coil pair on this axis.
    pub fn coils(self) -> (Coil, Coil) {
        match self {
            Axis::X => (Coil::PlusX, Coil::MinusX),
            Axis::Y => (Coil::PlusY, Coil::MinusY),
        }
    }

    /// Component of `p` along this axis.
    #[inline]
    pub fn component(self, p: [f64; 2]) -> f64 {
        match self {
            Axis::X => p[0],
            Axis::Y => p[1],
        }
    }
}

/// Direction along an axis that currently receives a stagnation boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostDirection {
    #[default]
    None,
    Positive,
    Negative,
}

impl BoostDirection {
    pub fn from_travel(travel: f64) -> Self {
        if travel > 0.0 {
            BoostDirection::Positive
        } else if travel < 0.0 {
            BoostDirection::Negative
        } else {
            BoostDirection::None
        }
    }

    /// Whether a boost in this direction applies to `coil`.
    pub fn applies_to(self, coil: Coil) -> bool {
        match self {
            BoostDirection::None => false,
            BoostDirection::Positive => coil.is_positive(),
            BoostDirection::Negative => !coil.is_positive(),
        }
    }
}

/// One value per coil, indexable by [`Coil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct CoilSet<T> {
    pub plus_x: T,
    pub minus_x: T,
    pub plus_y: T,
    pub minus_y: T,
}

impl<T> CoilSet<T> {
    pub fn from_fn(mut f: impl FnMut(Coil) -> T) -> Self {
        Self {
            plus_x: f(Coil::PlusX),
            minus_x: f(Coil::MinusX),
            plus_y: f(Coil::PlusY),
            minus_y: f(Coil::MinusY),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Coil, &T)> + '_ {
        Coil::ALL.into_iter().map(move |c| (c, &self[c]))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Coil, &T) -> U) -> CoilSet<U> {
        CoilSet::from_fn(|c| f(c, &self[c]))
    }
}

impl<T> Index<Coil> for CoilSet<T> {
    type Output = T;

    fn index(&self, coil: Coil) -> &T {
        match coil {
            Coil::PlusX => &self.plus_x,
            Coil::MinusX => &self.minus_x,
            Coil::PlusY => &self.plus_y,
            Coil::MinusY => &self.minus_y,
        }
    }
}

impl<T> IndexMut<Coil> for CoilSet<T> {
    fn index_mut(&mut self, coil: Coil) -> &mut T {
        match coil {
            Coil::PlusX => &mut self.plus_x,
            Coil::MinusX => &mut self.minus_x,
            Coil::PlusY => &mut self.plus_y,
            Coil::MinusY => &mut self.minus_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_sign_selects_coil() {
        assert_eq!(Coil::for_travel(Axis::X, 0.3), Some(Coil::PlusX));
        assert_eq!(Coil::for_travel(Axis::X, -0.3), Some(Coil::MinusX));
        assert_eq!(Coil::for_travel(Axis::Y, 2.0), Some(Coil::PlusY));
        assert_eq!(Coil::for_travel(Axis::Y, -2.0), Some(Coil::MinusY));
        assert_eq!(Coil::for_travel(Axis::Y, 0.0), None);
    }

    #[test]
    fn boost_direction_matches_coil_polarity() {
        assert!(BoostDirection::Positive.applies_to(Coil::PlusX));
        assert!(!BoostDirection::Positive.applies_to(Coil::MinusY));
        assert!(BoostDirection::Negative.applies_to(Coil::MinusY));
        assert!(!BoostDirection::None.applies_to(Coil::PlusY));
    }

    #[test]
    fn coil_set_indexing_follows_canonical_order() {
        let mut set = CoilSet::from_fn(|c| c.index());
        assert_eq!(set[Coil::PlusY], 2);
        set[Coil::MinusX] = 9;
        let collected: Vec<_> = set.iter().map(|(c, v)| (c.label(), *v)).collect();
        assert_eq!(collected, vec![("+X", 0), ("-X", 9), ("+Y", 2), ("-Y", 3)]);
    }
}
