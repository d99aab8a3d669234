use glam::{Mat4, Vec3};

use crate::math::{frustum::Frustum, plane::Plane};

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> BoundingSphere {
        BoundingSphere { center, radius }
    }

    /// World-space sphere enclosing `bounds` placed by `matrix`. Only the two
    /// extreme corners are transformed, so rotated boxes get a looser fit.
    pub fn from_local_bounds(matrix: &Mat4, bounds: &AABB) -> BoundingSphere {
        let world_min = matrix.transform_point3(bounds.min);
        let world_max = matrix.transform_point3(bounds.max);

        BoundingSphere {
            center: (world_min + world_max) * 0.5,
            radius: (world_max - world_min).length() * 0.5,
        }
    }

    pub fn signed_distance_to_plane(&self, plane: &Plane) -> f32 {
        plane.signed_distance_to_point(self.center)
    }

    pub fn is_outside_plane(&self, plane: &Plane) -> bool {
        self.signed_distance_to_plane(plane) < -self.radius
    }

    pub fn intersects_frustum(&self, frustum: &Frustum) -> bool {
        !frustum
            .planes
            .iter()
            .any(|plane| self.is_outside_plane(plane))
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

impl AABB {
    pub fn new(point1: Vec3, point2: Vec3) -> AABB {
        let min = point1.min(point2);
        let max = point1.max(point2);
        AABB { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// A box of `half_extents` around the origin of its own space, placed in
/// the world by `matrix`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OrientedBox {
    pub matrix: Mat4,
    pub half_extents: Vec3,
}

impl OrientedBox {
    pub fn new(matrix: Mat4, half_extents: Vec3) -> OrientedBox {
        OrientedBox {
            matrix,
            half_extents: half_extents.abs(),
        }
    }

    pub fn world_corners(&self) -> [Vec3; 8] {
        let Vec3 { x, y, z } = self.half_extents;

        [
            Vec3::new(-x, y, z),
            Vec3::new(x, -y, z),
            Vec3::new(x, y, -z),
            Vec3::new(-x, -y, z),
            Vec3::new(x, -y, -z),
            Vec3::new(-x, y, -z),
            Vec3::new(-x, -y, -z),
            Vec3::new(x, y, z),
        ]
        .map(|corner| self.matrix.transform_point3(corner))
    }
}
