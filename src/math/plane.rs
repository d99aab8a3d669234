use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4, Vec4Swizzles};

/// A plane in Hessian normal form. Points on the side the normal points to
/// have a positive signed distance.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Plane {
        Plane { normal, distance }
    }

    /// Builds a plane from `(a, b, c, d)` coefficients of `ax + by + cz + d = 0`,
    /// normalizing so the normal has unit length.
    pub fn from_coefficients(coefficients: Vec4) -> Plane {
        let normal = coefficients.xyz();
        let length = normal.length();

        if length <= f32::EPSILON {
            return Plane::new(Vec3::ZERO, coefficients.w);
        }

        Plane::new(normal / length, coefficients.w / length)
    }

    pub fn signed_distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}
