use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::math::{bounds::OrientedBox, frustum::Frustum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

/// Coarse result for a whole culling box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionVisibility {
    /// Every contained instance is culled without a per-instance test.
    Outside,
    /// Every contained instance is visible without a per-instance test.
    Inside,
    /// Contained instances fall through to the per-instance test.
    Straddling,
}

pub type RegionResults = HashMap<RegionId, RegionVisibility>;

/// Tests the eight corners of `region` against `frustum`.
///
/// The box is outside only when no plane has corners on both of its sides and
/// every corner is behind some plane. `Inside` is never reported, so a box
/// that is not provably outside is always handed to the per-instance test.
pub fn classify_region(region: &OrientedBox, frustum: &Frustum) -> RegionVisibility {
    let corners = region.world_corners();

    let outside_count = corners
        .iter()
        .filter(|corner| {
            frustum
                .planes
                .iter()
                .any(|plane| plane.signed_distance_to_point(**corner) < 0.0)
        })
        .count();

    for plane in &frustum.planes {
        let side = plane.signed_distance_to_point(corners[0]);

        if corners[1..]
            .iter()
            .any(|corner| plane.signed_distance_to_point(*corner) * side < 0.0)
        {
            return RegionVisibility::Straddling;
        }
    }

    if outside_count == corners.len() {
        RegionVisibility::Outside
    } else {
        RegionVisibility::Straddling
    }
}

#[derive(Debug, Default)]
pub struct CullingRegions {
    boxes: BTreeMap<RegionId, OrientedBox>,
    results: RegionResults,
}

impl CullingRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: RegionId, matrix: Mat4, half_extents: Vec3) {
        self.boxes.insert(id, OrientedBox::new(matrix, half_extents));
    }

    pub fn remove(&mut self, id: RegionId) -> bool {
        self.results.remove(&id);
        self.boxes.remove(&id).is_some()
    }

    pub fn get(&self, id: RegionId) -> Option<&OrientedBox> {
        self.boxes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn evaluate(&mut self, frustum: &Frustum) {
        self.results = self
            .boxes
            .par_iter()
            .map(|(id, region)| (*id, classify_region(region, frustum)))
            .collect();
    }

    /// Results of the last `evaluate`.
    pub fn results(&self) -> &RegionResults {
        &self.results
    }
}
