//! Rays and small geometric helpers.

use crate::core::common::{Float, EPSILON};
use glam::{Quat, Vec3};

/// A ray with a unit direction.
#[derive(Copy, Clone, Debug)]
pub struct Ray {
    /// Origin.
    pub origin: Vec3,

    /// Unit direction.
    pub direction: Vec3,

    /// Whether the ray was spawned by a refraction event. Intersectors may
    /// use this to bias surface tests.
    pub refracted: bool,
}

impl Ray {
    /// Creates a new ray.
    ///
    /// * `origin`    - Origin.
    /// * `direction` - Unit direction.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction, refracted: false }
    }

    /// Creates a ray spawned at a surface, offset a small distance along its
    /// direction to avoid re-intersecting the surface it left.
    ///
    /// * `point`     - Surface point.
    /// * `direction` - Unit direction.
    pub fn bounced(point: Vec3, direction: Vec3) -> Self {
        Self {
            origin: point + direction * EPSILON,
            direction,
            refracted: true,
        }
    }

    /// Creates a ray from one point toward another.
    ///
    /// * `from` - Origin.
    /// * `to`   - Target point.
    pub fn between(from: Vec3, to: Vec3) -> Self {
        Self::new(from, (to - from).normalize_or_zero())
    }

    /// Returns the point at parameter `t` along the ray.
    pub fn at(&self, t: Float) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Returns a unit vector perpendicular to `v`, built by swapping
/// coordinates, with a fallback when `v` is near ±ẑ.
///
/// * `v` - A unit vector.
pub fn perpendicular_axis(v: Vec3) -> Vec3 {
    let u = if 1.0 - v.z.abs() < 0.1 {
        Vec3::new(v.z, 0.0, -v.x)
    } else {
        Vec3::new(v.y, -v.x, 0.0)
    };
    u.normalize()
}

/// Rotates `v` about `axis` by `angle` radians.
///
/// * `v`     - The vector to rotate.
/// * `axis`  - Unit rotation axis.
/// * `angle` - Rotation angle in radians.
pub fn rotate_about(v: Vec3, axis: Vec3, angle: Float) -> Vec3 {
    Quat::from_axis_angle(axis, angle) * v
}
