use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};

use crate::{
    culling::{RegionId, RegionResults, RegionVisibility},
    math::{bounds::BoundingSphere, frustum::Frustum},
};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullResult {
    #[default]
    Visible,
    /// Sphere is behind one of the frustum planes
    Outside,
    /// Owning culling box was rejected as a whole
    RegionOutside,
    /// Projected footprint leaves the viewport
    DetailOutside,
}

impl CullResult {
    pub fn is_visible(self) -> bool {
        self == CullResult::Visible
    }
}

/// Screen-space test applied to crowd members after the sphere test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetailCull {
    pub view_projection: Mat4,
    pub camera_up: Vec3,
}

impl DetailCull {
    pub fn new(view_projection: Mat4, camera_up: Vec3) -> Self {
        Self {
            view_projection,
            camera_up,
        }
    }

    fn project(&self, point: Vec3) -> Option<Vec2> {
        let clip = self.view_projection * point.extend(1.0);

        if clip.w <= f32::EPSILON {
            return None;
        }

        Some(clip.xy() / clip.w)
    }

    /// The projected centre and the four corners of the projected radius
    /// square must all stay inside the viewport.
    pub fn passes(&self, sphere: &BoundingSphere) -> bool {
        let Some(center) = self.project(sphere.center) else {
            return false;
        };

        if !in_viewport(center) {
            return false;
        }

        let Some(up) = self.project(sphere.center + self.camera_up * sphere.radius) else {
            return false;
        };

        let radius = up.y - center.y;

        [
            Vec2::new(radius, radius),
            Vec2::new(-radius, radius),
            Vec2::new(radius, -radius),
            Vec2::new(-radius, -radius),
        ]
        .into_iter()
        .all(|offset| in_viewport(center + offset))
    }
}

fn in_viewport(point: Vec2) -> bool {
    point.cmpge(Vec2::NEG_ONE).all() && point.cmple(Vec2::ONE).all()
}

/// Visibility of a single bounding slot. Pure in its inputs, so slots can be
/// tested in any order.
pub fn cull_slot(
    sphere: &BoundingSphere,
    region: Option<RegionId>,
    needs_detail: bool,
    frustum: &Frustum,
    regions: &RegionResults,
    detail: Option<&DetailCull>,
) -> CullResult {
    match region.and_then(|id| regions.get(&id)) {
        Some(RegionVisibility::Outside) => return CullResult::RegionOutside,
        Some(RegionVisibility::Inside) => return CullResult::Visible,
        Some(RegionVisibility::Straddling) | None => {}
    }

    if !sphere.intersects_frustum(frustum) {
        return CullResult::Outside;
    }

    match detail {
        Some(detail) if needs_detail && !detail.passes(sphere) => CullResult::DetailOutside,
        _ => CullResult::Visible,
    }
}
