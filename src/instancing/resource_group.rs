use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::{
    animation::BakedAnimationSheet,
    culling::{classify_band, validate_bands, LodBand},
    error::EngineError,
    instancing::{DrawList, InstanceHandle, InstanceKind, ResourceKey},
};

/// Per-slot state of a group member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Member {
    pub handle: InstanceHandle,
    pub kind: InstanceKind,
    /// Result of the last cull
    pub cull_visible: bool,
    /// Hidden by the owner
    pub hidden: bool,
    pub band: Option<usize>,
}

impl Member {
    pub fn new(handle: InstanceHandle, kind: InstanceKind) -> Self {
        Self {
            handle,
            kind,
            cull_visible: true,
            hidden: false,
            band: Some(0),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.cull_visible && !self.hidden
    }
}

/// All instances sharing one resource key. `members` and `transforms` are
/// parallel and indexed by slot.
#[derive(Debug)]
pub struct ResourceGroup {
    key: ResourceKey,
    members: Vec<Member>,
    transforms: Vec<Mat4>,
    lod_bands: Vec<LodBand>,
    draw_list: DrawList,
    visibility_changed: bool,
    rebuild_count: u64,
}

impl ResourceGroup {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            members: Vec::new(),
            transforms: Vec::new(),
            lod_bands: Vec::new(),
            draw_list: DrawList::default(),
            visibility_changed: true,
            rebuild_count: 0,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.members.capacity()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, slot: usize) -> Option<&Member> {
        self.members.get(slot)
    }

    pub fn transforms(&self) -> &[Mat4] {
        &self.transforms
    }

    pub fn lod_bands(&self) -> &[LodBand] {
        &self.lod_bands
    }

    pub fn band_count(&self) -> usize {
        self.lod_bands.len().max(1)
    }

    /// Valid only while `is_dirty` is false.
    pub fn draw_list(&self) -> &DrawList {
        &self.draw_list
    }

    pub fn is_dirty(&self) -> bool {
        self.visibility_changed
    }

    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    pub fn mark_dirty(&mut self) {
        self.visibility_changed = true;
    }

    pub fn join(&mut self, member: Member, transform: Mat4) -> usize {
        if self.members.len() == self.members.capacity() {
            let additional = self.members.capacity().max(1);
            self.members.reserve_exact(additional);
            self.transforms.reserve_exact(additional);
        }

        let slot = self.members.len();
        self.members.push(member);
        self.transforms.push(transform);
        self.visibility_changed = true;
        slot
    }

    /// Swap-removes `slot` and returns the handle that now occupies it.
    pub fn quit(&mut self, slot: usize) -> Option<InstanceHandle> {
        if slot >= self.members.len() {
            return None;
        }

        self.members.swap_remove(slot);
        self.transforms.swap_remove(slot);
        self.visibility_changed = true;

        self.members.get(slot).map(|member| member.handle)
    }

    pub fn update_transform(&mut self, slot: usize, transform: Mat4) {
        if let Some(current) = self.transforms.get_mut(slot) {
            *current = transform;
            self.visibility_changed = true;
        }
    }

    pub fn set_cull_visible(&mut self, slot: usize, visible: bool) {
        if let Some(member) = self.members.get_mut(slot) {
            if member.cull_visible != visible {
                member.cull_visible = visible;
                self.visibility_changed = true;
            }
        }
    }

    pub fn set_hidden(&mut self, slot: usize, hidden: bool) {
        if let Some(member) = self.members.get_mut(slot) {
            if member.hidden != hidden {
                member.hidden = hidden;
                self.visibility_changed = true;
            }
        }
    }

    pub fn set_lod_bands(&mut self, bands: Vec<LodBand>) -> Result<(), EngineError> {
        validate_bands(&bands)?;
        self.lod_bands = bands;
        self.visibility_changed = true;
        Ok(())
    }

    /// Assigns a band to every visible member. Marks the group dirty when any
    /// member moved between bands.
    pub fn classify(&mut self, camera_position: Vec3, min_slots_per_task: usize) {
        let bands = &self.lod_bands;

        let changed = self
            .members
            .par_iter_mut()
            .zip(self.transforms.par_iter())
            .with_min_len(min_slots_per_task.max(1))
            .map(|(member, transform)| {
                let band = if member.is_visible() {
                    classify_band(transform.w_axis.truncate(), camera_position, bands)
                } else {
                    None
                };

                let changed = band != member.band;
                member.band = band;
                changed
            })
            .reduce(|| false, |a, b| a || b);

        if changed {
            self.visibility_changed = true;
        }
    }

    /// Recompacts the draw list when something changed since the last build.
    /// Returns whether any work was done.
    pub fn rebuild_if_dirty(
        &mut self,
        limit: usize,
        visible_probability: f32,
        sheet: Option<&BakedAnimationSheet>,
    ) -> bool {
        if !self.visibility_changed {
            return false;
        }

        self.draw_list.rebuild(
            &self.members,
            &self.transforms,
            self.band_count(),
            limit,
            visible_probability,
            sheet,
        );
        self.visibility_changed = false;
        self.rebuild_count += 1;
        true
    }
}
