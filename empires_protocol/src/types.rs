// Core value types shared by the wire protocol and the simulation.
//
// `Color` names a player slot. The relay owns one socket per color and the
// packet carries one snapshot per color, so the slot count is fixed at
// compile time (`COLOR_COUNT`). The last color is the neutral owner.
//
// `Point` is the integer 2D vector used for every coordinate space (screen,
// iso, cart, grid point, cell). All arithmetic is integer-only so that every
// client computes bit-identical results.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Number of player slots. Packets always carry exactly this many snapshots.
pub const COLOR_COUNT: usize = 8;

/// A player slot. Ordering is slot order and is part of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    Blue,
    Red,
    Green,
    Yellow,
    Cyan,
    Purple,
    Orange,
    /// Neutral owner (wildlife, resources). Never commanded by a human.
    Grey,
}

impl Color {
    /// Every color in slot order.
    pub const ALL: [Color; COLOR_COUNT] = [
        Color::Blue,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Cyan,
        Color::Purple,
        Color::Orange,
        Color::Grey,
    ];

    /// Slot index of this color.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Inverse of `index()`. Returns `None` past the last slot.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::Blue => "blue",
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Cyan => "cyan",
            Color::Purple => "purple",
            Color::Orange => "orange",
            Color::Grey => "grey",
        };
        f.write_str(name)
    }
}

/// Integer 2D point / vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn scale(self, n: i32) -> Self {
        Self::new(self.x * n, self.y * n)
    }

    /// Component-wise division, truncating toward zero.
    pub const fn div_by(self, n: i32) -> Self {
        Self::new(self.x / n, self.y / n)
    }

    /// Component-wise add that pins at the `i32` bounds. For values that
    /// come straight off the wire.
    pub const fn saturating_add(self, rhs: Point) -> Self {
        Self::new(self.x.saturating_add(rhs.x), self.y.saturating_add(rhs.y))
    }

    pub const fn saturating_sub(self, rhs: Point) -> Self {
        Self::new(self.x.saturating_sub(rhs.x), self.y.saturating_sub(rhs.y))
    }

    /// Squared length, widened so it cannot overflow.
    pub fn mag_squared(self) -> i64 {
        let x = i64::from(self.x);
        let y = i64::from(self.y);
        x * x + y * y
    }

    /// Integer length (floor of the euclidean norm).
    pub fn mag(self) -> i32 {
        let root = self.mag_squared().unsigned_abs().isqrt();
        i32::try_from(root).unwrap_or(i32::MAX)
    }

    /// Rescale to length `magnitude`, keeping direction. The zero vector
    /// stays zero.
    pub fn normalize(self, magnitude: i32) -> Self {
        let mag = i64::from(self.mag());
        if mag == 0 {
            return Self::ZERO;
        }
        let m = i64::from(magnitude);
        Self::new(
            (i64::from(self.x) * m / mag) as i32,
            (i64::from(self.y) * m / mag) as i32,
        )
    }

    /// Shorten to at most `magnitude`, leaving shorter vectors untouched.
    pub fn clamp_mag(self, magnitude: i32) -> Self {
        if self.mag_squared() > i64::from(magnitude) * i64::from(magnitude) {
            self.normalize(magnitude)
        } else {
            self
        }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_index_roundtrip() {
        for (i, color) in Color::ALL.iter().enumerate() {
            assert_eq!(color.index(), i);
            assert_eq!(Color::from_index(i), Some(*color));
        }
        assert_eq!(Color::from_index(COLOR_COUNT), None);
    }

    #[test]
    fn mag_is_floor_of_norm() {
        assert_eq!(Point::new(3, 4).mag(), 5);
        assert_eq!(Point::new(1, 1).mag(), 1);
        assert_eq!(Point::new(-6, 8).mag(), 10);
        assert_eq!(Point::ZERO.mag(), 0);
    }

    #[test]
    fn normalize_keeps_direction() {
        assert_eq!(Point::new(30, 40).normalize(10), Point::new(6, 8));
        assert_eq!(Point::new(0, -7).normalize(3), Point::new(0, -3));
        assert_eq!(Point::ZERO.normalize(10), Point::ZERO);
    }

    #[test]
    fn clamp_mag_only_shortens() {
        assert_eq!(Point::new(3, 4).clamp_mag(10), Point::new(3, 4));
        assert_eq!(Point::new(30, 40).clamp_mag(5), Point::new(3, 4));
    }
}
