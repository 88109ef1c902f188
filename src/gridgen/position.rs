//! Canonical grid positions.
//!
//! A `GridPosition` stores each component as a fixed-point integer in units of
//! `10^-PRECISION_DIGITS`. Rounding happens once at construction, so two
//! float paths that land on the same hex cell always produce the same key, and
//! adding two positions never accumulates error.

use std::fmt;
use std::ops::{Add, Sub};

use glam::Vec3;

/// Number of decimal digits kept per component.
pub const PRECISION_DIGITS: u32 = 5;

const SCALE: f64 = 100_000.0;

#[inline(always)]
fn quantize(value: f64) -> i64 {
    (value * SCALE).round() as i64
}

/// Rounded 3D coordinate used as the merge key during expansion.
///
/// Ordering is lexicographic on `(x, y, z)` of the rounded value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridPosition {
    x: i64,
    y: i64,
    z: i64,
}

impl GridPosition {
    pub const ORIGIN: GridPosition = GridPosition { x: 0, y: 0, z: 0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: quantize(x),
            y: quantize(y),
            z: quantize(z),
        }
    }

    /// Build directly from fixed-point units (`1 unit = 1e-5`).
    #[inline]
    pub const fn from_units(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn units(self) -> (i64, i64, i64) {
        (self.x, self.y, self.z)
    }

    #[inline]
    pub fn x(self) -> f64 {
        self.x as f64 / SCALE
    }

    #[inline]
    pub fn y(self) -> f64 {
        self.y as f64 / SCALE
    }

    #[inline]
    pub fn z(self) -> f64 {
        self.z as f64 / SCALE
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x(), self.y(), self.z()]
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x() as f32, self.y() as f32, self.z() as f32)
    }
}

impl From<Vec3> for GridPosition {
    fn from(v: Vec3) -> Self {
        Self::new(v.x as f64, v.y as f64, v.z as f64)
    }
}

impl From<[f64; 3]> for GridPosition {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<GridPosition> for [f64; 3] {
    fn from(p: GridPosition) -> Self {
        p.to_array()
    }
}

impl From<GridPosition> for Vec3 {
    fn from(p: GridPosition) -> Self {
        p.to_vec3()
    }
}

impl Add for GridPosition {
    type Output = GridPosition;

    #[inline]
    fn add(self, rhs: GridPosition) -> GridPosition {
        GridPosition {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for GridPosition {
    type Output = GridPosition;

    #[inline]
    fn sub(self, rhs: GridPosition) -> GridPosition {
        GridPosition {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5}, {:.5})", self.x(), self.y(), self.z())
    }
}

#[cfg(test)]
mod tests {
    use super::GridPosition;
    use glam::Vec3;

    #[test]
    fn float_drift_collapses_to_one_key() {
        let a = GridPosition::new(1.81865, 0.0, -1.05);
        let b = GridPosition::new(1.818_650_000_4, 1e-9, -1.049_999_999_7);
        assert_eq!(a, b);
    }

    #[test]
    fn sixth_digit_is_rounded_away() {
        assert_eq!(
            GridPosition::new(0.123_454_9, 0.0, 0.0),
            GridPosition::new(0.12345, 0.0, 0.0)
        );
        assert_ne!(
            GridPosition::new(0.12346, 0.0, 0.0),
            GridPosition::new(0.12345, 0.0, 0.0)
        );
    }

    #[test]
    fn addition_is_exact_around_a_hex_ring() {
        let step = [
            GridPosition::new(0.0, 0.0, -2.1),
            GridPosition::new(-1.81865, 0.0, -1.05),
            GridPosition::new(-1.81865, 0.0, 1.05),
            GridPosition::new(0.0, 0.0, 2.1),
            GridPosition::new(1.81865, 0.0, 1.05),
            GridPosition::new(1.81865, 0.0, -1.05),
        ];
        let mut p = GridPosition::new(3.0, 0.0, 7.0);
        let start = p;
        for _ in 0..1000 {
            for s in step {
                p = p + s;
            }
        }
        assert_eq!(p, start);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = GridPosition::new(0.0, 5.0, 5.0);
        let b = GridPosition::new(1.0, 0.0, 0.0);
        let c = GridPosition::new(1.0, 0.0, 0.5);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn vec3_conversion_keeps_rounded_value() {
        let p = GridPosition::from(Vec3::new(2.5, 0.0, -1.05));
        let v = p.to_vec3();
        assert!((v.x - 2.5).abs() < 1e-6);
        assert!((v.z + 1.05).abs() < 1e-6);
        assert_eq!(GridPosition::from(v), p);
    }

    #[test]
    fn array_conversion_keeps_rounded_value() {
        let p = GridPosition::from([1.818_654, 0.0, -1.05]);
        assert_eq!(p.to_array(), [1.81865, 0.0, -1.05]);
        let back: [f64; 3] = p.into();
        assert_eq!(GridPosition::from(back), p);
    }
}
