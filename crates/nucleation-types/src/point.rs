//! Spatial coordinates in a `D`-dimensional domain.
//!
//! [`Point`] is a thin wrapper around `[f64; D]`. Distances are Euclidean
//! and never wrap across periodic axes.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A point in the `D`-dimensional simulation domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point<const D: usize>(pub [f64; D]);

impl<const D: usize> Point<D> {
    /// Create a point from its coordinates.
    pub const fn new(coords: [f64; D]) -> Self {
        Self(coords)
    }

    /// The origin of the domain.
    pub const fn origin() -> Self {
        Self([0.0; D])
    }

    /// Borrow the coordinate array.
    pub const fn coords(&self) -> &[f64; D] {
        &self.0
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_squared(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

impl<const D: usize> Default for Point<D> {
    fn default() -> Self {
        Self::origin()
    }
}

impl<const D: usize> From<[f64; D]> for Point<D> {
    fn from(coords: [f64; D]) -> Self {
        Self(coords)
    }
}

impl<const D: usize> core::fmt::Display for Point<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}

// serde only derives array impls for fixed literal lengths, so points
// serialize as a plain sequence and are length-checked on the way back in.
impl<const D: usize> Serialize for Point<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de, const D: usize> Deserialize<'de> for Point<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let raw = Vec::<f64>::deserialize(deserializer)?;
        let len = raw.len();
        let coords: [f64; D] = raw
            .try_into()
            .map_err(|_rejected: Vec<f64>| De::Error::invalid_length(len, &"one coordinate per axis"))?;
        Ok(Self(coords))
    }
}
