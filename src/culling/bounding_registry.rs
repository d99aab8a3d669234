use rayon::prelude::*;

use crate::{
    culling::{cull_stage::cull_slot, CullResult, DetailCull, RegionId, RegionResults},
    instancing::InstanceHandle,
    math::{bounds::BoundingSphere, frustum::Frustum},
};

/// Flat arrays of bounding spheres for every attached instance, independent
/// of resource grouping. All per-slot arrays share one length and grow
/// together.
#[derive(Debug, Default)]
pub struct BoundingRegistry {
    spheres: Vec<BoundingSphere>,
    owners: Vec<InstanceHandle>,
    regions: Vec<Option<RegionId>>,
    detail: Vec<bool>,
    results: Vec<CullResult>,
}

impl BoundingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.spheres.capacity()
    }

    fn grow_if_full(&mut self) {
        if self.spheres.len() < self.spheres.capacity() {
            return;
        }

        let additional = self.spheres.capacity().max(1);
        self.spheres.reserve_exact(additional);
        self.owners.reserve_exact(additional);
        self.regions.reserve_exact(additional);
        self.detail.reserve_exact(additional);
        self.results.reserve_exact(additional);
    }

    pub fn insert(
        &mut self,
        sphere: BoundingSphere,
        owner: InstanceHandle,
        region: Option<RegionId>,
        needs_detail: bool,
    ) -> usize {
        self.grow_if_full();

        let slot = self.spheres.len();
        self.spheres.push(sphere);
        self.owners.push(owner);
        self.regions.push(region);
        self.detail.push(needs_detail);
        self.results.push(CullResult::Visible);
        slot
    }

    /// Swap-removes `slot`. Returns the owner that was moved into `slot`, whose
    /// bounding slot the caller must patch.
    pub fn remove(&mut self, slot: usize) -> Option<InstanceHandle> {
        if slot >= self.spheres.len() {
            return None;
        }

        self.spheres.swap_remove(slot);
        self.owners.swap_remove(slot);
        self.regions.swap_remove(slot);
        self.detail.swap_remove(slot);
        self.results.swap_remove(slot);

        self.owners.get(slot).copied()
    }

    pub fn update(&mut self, slot: usize, sphere: BoundingSphere) {
        if let Some(current) = self.spheres.get_mut(slot) {
            *current = sphere;
        }
    }

    pub fn set_region(&mut self, slot: usize, region: Option<RegionId>) {
        if let Some(current) = self.regions.get_mut(slot) {
            *current = region;
        }
    }

    pub fn sphere(&self, slot: usize) -> Option<&BoundingSphere> {
        self.spheres.get(slot)
    }

    pub fn owner(&self, slot: usize) -> Option<InstanceHandle> {
        self.owners.get(slot).copied()
    }

    pub fn region(&self, slot: usize) -> Option<RegionId> {
        self.regions.get(slot).copied().flatten()
    }

    pub fn owners(&self) -> &[InstanceHandle] {
        &self.owners
    }

    /// Results of the last `cull`, indexed by bounding slot.
    pub fn results(&self) -> &[CullResult] {
        &self.results
    }

    /// Tests every slot in parallel. Each task reads only its own slot and
    /// writes only its own result; the call returns once all tasks finished.
    pub fn cull(
        &mut self,
        frustum: &Frustum,
        regions: &RegionResults,
        detail: Option<&DetailCull>,
        min_slots_per_task: usize,
    ) {
        self.results
            .par_iter_mut()
            .zip(self.spheres.par_iter())
            .zip(self.regions.par_iter())
            .zip(self.detail.par_iter())
            .with_min_len(min_slots_per_task.max(1))
            .for_each(|(((result, sphere), region), needs_detail)| {
                *result = cull_slot(sphere, *region, *needs_detail, frustum, regions, detail);
            });
    }
}
