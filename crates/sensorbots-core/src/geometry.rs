//! Planar vectors, poses, colours and textures.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Wrap an angle into `(-π, π]`.
#[must_use]
pub fn normalize_angle(mut angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    while angle > PI {
        angle -= TAU;
    }
    while angle <= -PI {
        angle += TAU;
    }
    angle
}

/// 2D vector in world units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

impl Vector {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle`.
    #[must_use]
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    #[must_use]
    pub fn norm(self) -> f64 {
        self.norm2().sqrt()
    }

    #[must_use]
    pub fn norm2(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Direction of the vector, in `[-π, π]`.
    #[must_use]
    pub fn angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    /// Z component of the 3D cross product.
    #[must_use]
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Rotate counter-clockwise by `angle` radians.
    #[must_use]
    pub fn rotated(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(cos * self.x - sin * self.y, sin * self.x + cos * self.y)
    }
}

impl Add for Vector {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vector {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vector {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vector {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vector {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Position plus heading of a body.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub position: Vector,
    pub heading: f64,
}

impl Pose {
    #[must_use]
    pub const fn new(position: Vector, heading: f64) -> Self {
        Self { position, heading }
    }

    /// Map a body-relative offset into world coordinates.
    #[must_use]
    pub fn to_world(&self, offset: Vector) -> Vector {
        self.position + offset.rotated(self.heading)
    }
}

/// RGB colour with components nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);
    pub const GRAY: Self = Self::new(0.5, 0.5, 0.5);

    #[must_use]
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Mean of the three components.
    #[must_use]
    pub fn to_gray(self) -> f64 {
        (self.r + self.g + self.b) / 3.0
    }

    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor)
    }

    /// Zero every component that does not exceed the matching component of `limit`.
    #[must_use]
    pub fn thresholded(self, limit: Self) -> Self {
        let keep = |v: f64, l: f64| if v > l { v } else { 0.0 };
        Self::new(
            keep(self.r, limit.r),
            keep(self.g, limit.g),
            keep(self.b, limit.b),
        )
    }
}

/// Colour strip painted along a segment, sampled uniformly from start to end.
pub type Texture = Vec<Color>;
