use std::collections::HashMap;

use crate::{
    error::JoinError,
    instancing::{GeometryId, ResourceKey, SurfaceId},
    math::bounds::AABB,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub supports_instancing: bool,
}

impl Default for SurfaceInfo {
    fn default() -> Self {
        Self {
            supports_instancing: true,
        }
    }
}

/// Draw resources known to the engine. Geometry is only described by its
/// local bounds; the GPU-side data lives with the submitter.
#[derive(Debug, Default)]
pub struct ResourceCatalog {
    geometries: HashMap<GeometryId, AABB>,
    surfaces: HashMap<SurfaceId, SurfaceInfo>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_geometry(&mut self, id: GeometryId, local_bounds: AABB) {
        self.geometries.insert(id, local_bounds);
    }

    pub fn register_surface(&mut self, id: SurfaceId, info: SurfaceInfo) {
        self.surfaces.insert(id, info);
    }

    /// Checks that `key` can be drawn instanced and returns the local bounds
    /// of its geometry.
    pub fn resolve(&self, key: &ResourceKey) -> Result<AABB, JoinError> {
        let bounds = self
            .geometries
            .get(&key.geometry)
            .ok_or(JoinError::MissingGeometry(key.geometry))?;

        let surface = self
            .surfaces
            .get(&key.surface)
            .ok_or(JoinError::MissingSurface(key.surface))?;

        if !surface.supports_instancing {
            return Err(JoinError::InstancingDisabled(key.surface));
        }

        Ok(*bounds)
    }
}
