//! Minimal world-space math for the embodiment.
//!
//! The world is Y-up: locomotion happens on the X/Z ground plane and facing
//! is a yaw rotation about the Y axis.

use serde::{Deserialize, Serialize};

/// A 3-D world-space vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    /// `true` when every component is finite (no NaN, no infinity).
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Distance to `other` measured on the ground plane, ignoring height.
    ///
    /// Saturates to infinity only when the true distance exceeds `f32::MAX`.
    pub fn planar_distance(self, other: Self) -> f32 {
        let (dx, dz) = self.planar_delta(other);
        dx.hypot(dz) as f32
    }

    /// Unit vector on the ground plane pointing from `self` towards `other`.
    ///
    /// Returns `None` when the two points coincide on the plane or either
    /// point is not finite.
    pub fn planar_direction_to(self, other: Self) -> Option<Self> {
        let (dx, dz) = self.planar_delta(other);
        let len = dx.hypot(dz);
        if len <= f64::from(f32::EPSILON) || !len.is_finite() {
            return None;
        }
        Some(Self::new((dx / len) as f32, 0.0, (dz / len) as f32))
    }

    /// Ground-plane offset to `other`, widened so far-apart points cannot
    /// overflow.
    fn planar_delta(self, other: Self) -> (f64, f64) {
        (
            f64::from(other.x) - f64::from(self.x),
            f64::from(other.z) - f64::from(self.z),
        )
    }
}

/// A rotation quaternion (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw_rad` about the world Y axis.
    pub fn from_yaw(yaw_rad: f32) -> Self {
        let half = yaw_rad * 0.5;
        Self::new(half.cos(), 0.0, half.sin(), 0.0)
    }

    /// Yaw that makes the +Z forward axis point along the planar `direction`.
    pub fn facing(direction: Vec3) -> Self {
        Self::from_yaw(direction.x.atan2(direction.z))
    }

    pub fn norm_squared(self) -> f32 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn is_finite(self) -> bool {
        self.w.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Scale to unit length. `None` for a zero or non-finite quaternion.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm_squared().sqrt();
        if n <= f32::EPSILON || !n.is_finite() {
            return None;
        }
        Some(Self::new(self.w / n, self.x / n, self.y / n, self.z / n))
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_ignores_height() {
        let a = Vec3::new(0.0, 10.0, 0.0);
        let b = Vec3::new(3.0, -4.0, 4.0);
        assert!((a.planar_distance(b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn planar_direction_is_unit_length() {
        let dir = Vec3::zero()
            .planar_direction_to(Vec3::new(3.0, 2.0, 4.0))
            .unwrap();
        assert!((dir.x - 0.6).abs() < 1e-6);
        assert!((dir.z - 0.8).abs() < 1e-6);
        assert_eq!(dir.y, 0.0);
    }

    #[test]
    fn planar_direction_none_for_same_point() {
        let p = Vec3::new(1.0, 0.0, 1.0);
        assert!(p.planar_direction_to(Vec3::new(1.0, 5.0, 1.0)).is_none());
    }

    #[test]
    fn far_points_keep_a_finite_heading() {
        let origin = Vec3::zero();
        let far = Vec3::new(1.0e20, 0.0, 0.0);
        assert!(origin.planar_distance(far) > 1.0e19);
        let dir = origin.planar_direction_to(far).unwrap();
        assert!((dir.x - 1.0).abs() < 1e-6);

        let a = Vec3::new(-3.0e38, 0.0, -3.0e38);
        let b = Vec3::new(3.0e38, 0.0, 3.0e38);
        assert_eq!(a.planar_distance(b), f32::INFINITY);
        let dir = a.planar_direction_to(b).unwrap();
        assert!((dir.x - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((dir.z - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn non_finite_points_have_no_heading() {
        let origin = Vec3::zero();
        assert!(origin.planar_direction_to(Vec3::new(f32::NAN, 0.0, 1.0)).is_none());
        assert!(origin.planar_direction_to(Vec3::new(f32::INFINITY, 0.0, 1.0)).is_none());
    }

    #[test]
    fn nan_vector_is_not_finite() {
        assert!(!Vec3::new(f32::NAN, 0.0, 0.0).is_finite());
        assert!(Vec3::new(1.0, 2.0, 3.0).is_finite());
    }

    #[test]
    fn normalize_restores_unit_length() {
        let q = Quaternion::new(2.0, 0.0, 0.0, 0.0).normalized().unwrap();
        assert!((q.norm_squared() - 1.0).abs() < 1e-6);
        assert!(Quaternion::new(0.0, 0.0, 0.0, 0.0).normalized().is_none());
    }

    #[test]
    fn facing_along_z_is_identity() {
        let q = Quaternion::facing(Vec3::new(0.0, 0.0, 1.0));
        assert!((q.w - 1.0).abs() < 1e-6);
        assert!(q.y.abs() < 1e-6);
    }
}
