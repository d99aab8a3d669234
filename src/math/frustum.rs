use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::math::plane::Plane;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Frustum {
    // Planes are in the order: left, right, bottom, top, near, far
    // All normals point inwards.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the planes of a view-projection matrix with a `[0, 1]` depth
    /// range, as produced by glam's `perspective_*` and `orthographic_*`.
    pub fn from_view_projection(view_projection: Mat4) -> Frustum {
        let row_x = view_projection.row(0);
        let row_y = view_projection.row(1);
        let row_z = view_projection.row(2);
        let row_w = view_projection.row(3);

        let planes = [
            // Left
            Plane::from_coefficients(row_w + row_x),
            // Right
            Plane::from_coefficients(row_w - row_x),
            // Bottom
            Plane::from_coefficients(row_w + row_y),
            // Top
            Plane::from_coefficients(row_w - row_y),
            // Near
            Plane::from_coefficients(row_z),
            // Far
            Plane::from_coefficients(row_w - row_z),
        ];

        Frustum { planes }
    }
}
