use std::collections::{HashMap, VecDeque};

use crossbeam_channel::{Receiver, Sender};
use glam::{Mat4, Vec3};
use id_arena::Arena;
use itertools::izip;
use rayon::prelude::*;
use slotmap::SlotMap;

use crate::{
    animation::{BakedAnimationSheet, ClipId},
    config::EngineConfig,
    culling::{BoundingRegistry, CullResult, CullingRegions, DetailCull, LodBand, RegionId},
    error::{EngineError, JoinError},
    instancing::{
        Attachment, GeometryId, GroupId, InstanceData, InstanceHandle, InstanceKind,
        InstanceRecord, Member, OwnerHandle, ResourceCatalog, ResourceGroup, ResourceKey,
        SurfaceId, SurfaceInfo,
    },
    math::{
        bounds::{BoundingSphere, AABB},
        frustum::Frustum,
    },
    rendering::{DrawBatch, DrawSubmitter},
};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    #[default]
    Idle,
    /// Joins and quits accumulate until the next tick applies them
    Registering,
    Culling,
    Classifying,
    Building,
    Submitting,
}

/// Supplies the current world matrix of an owner for instances that follow
/// their owner every frame.
pub trait TransformSource {
    fn world_matrix(&self, owner: OwnerHandle) -> Option<Mat4>;
}

/// Everything a tick needs to know about the camera.
#[derive(Clone, Copy)]
pub struct FrameInput<'a> {
    pub camera_position: Vec3,
    pub camera_up: Vec3,
    pub frustum: Frustum,
    pub delta_time: f32,
    /// Enables the screen-space detail test for animated instances
    pub view_projection: Option<Mat4>,
    pub transform_source: Option<&'a dyn TransformSource>,
}

impl<'a> FrameInput<'a> {
    pub fn new(camera_position: Vec3, camera_up: Vec3, frustum: Frustum, delta_time: f32) -> Self {
        Self {
            camera_position,
            camera_up,
            frustum,
            delta_time,
            view_projection: None,
            transform_source: None,
        }
    }

    /// Derives the frustum from `view_projection` and enables the detail test.
    pub fn from_camera(
        camera_position: Vec3,
        camera_up: Vec3,
        view_projection: Mat4,
        delta_time: f32,
    ) -> Self {
        Self::new(
            camera_position,
            camera_up,
            Frustum::from_view_projection(view_projection),
            delta_time,
        )
        .with_view_projection(view_projection)
    }

    pub fn with_view_projection(mut self, view_projection: Mat4) -> Self {
        self.view_projection = Some(view_projection);
        self
    }

    pub fn with_transform_source(mut self, source: &'a dyn TransformSource) -> Self {
        self.transform_source = Some(source);
        self
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub total: usize,
    pub visible: usize,
    pub region_culled: usize,
    pub detail_culled: usize,
    pub groups_rebuilt: usize,
    pub batches: usize,
    pub instances_submitted: usize,
}

#[derive(Debug, Clone, Copy)]
enum Registration {
    Attach(InstanceHandle),
    Quit(InstanceHandle),
    UpdateTransform(InstanceHandle, Mat4),
    SetVisible(InstanceHandle, bool),
}

/// Queues changes from other threads. They are applied at the start of the
/// next tick, in send order.
#[derive(Debug, Clone)]
pub struct Registrar {
    sender: Sender<Registration>,
}

impl Registrar {
    /// Returns false once the engine is gone.
    pub fn update_transform(&self, handle: InstanceHandle, transform: Mat4) -> bool {
        self.sender
            .send(Registration::UpdateTransform(handle, transform))
            .is_ok()
    }

    pub fn set_visible(&self, handle: InstanceHandle, visible: bool) -> bool {
        self.sender
            .send(Registration::SetVisible(handle, visible))
            .is_ok()
    }

    pub fn quit(&self, handle: InstanceHandle) -> bool {
        self.sender.send(Registration::Quit(handle)).is_ok()
    }
}

/// Engine context owning every instance, resource group and the bounding
/// registry. One `tick` runs a full frame.
pub struct InstancingEngine {
    config: EngineConfig,
    catalog: ResourceCatalog,
    groups: Arena<ResourceGroup>,
    group_ids: HashMap<ResourceKey, GroupId>,
    instances: SlotMap<InstanceHandle, InstanceRecord>,
    bounding: BoundingRegistry,
    regions: CullingRegions,
    animation_sheet: Option<BakedAnimationSheet>,
    animated_time: f32,
    phase: FramePhase,
    pending: VecDeque<Registration>,
    sender: Sender<Registration>,
    receiver: Receiver<Registration>,
    scratch: Vec<InstanceData>,
    stats: FrameStats,
}

impl InstancingEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let (sender, receiver) = crossbeam_channel::unbounded();

        Ok(Self {
            config,
            catalog: ResourceCatalog::new(),
            groups: Arena::new(),
            group_ids: HashMap::new(),
            instances: SlotMap::with_key(),
            bounding: BoundingRegistry::new(),
            regions: CullingRegions::new(),
            animation_sheet: None,
            animated_time: 0.0,
            phase: FramePhase::Idle,
            pending: VecDeque::new(),
            sender,
            receiver,
            scratch: Vec::new(),
            stats: FrameStats::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_geometry(&mut self, id: GeometryId, local_bounds: AABB) {
        self.catalog.register_geometry(id, local_bounds);
    }

    pub fn register_surface(&mut self, id: SurfaceId, info: SurfaceInfo) {
        self.catalog.register_surface(id, info);
    }

    pub fn set_animation_sheet(&mut self, sheet: Option<BakedAnimationSheet>) {
        self.animation_sheet = sheet;
        self.animated_time = 0.0;
        self.mark_all_dirty();
    }

    pub fn animation_sheet(&self) -> Option<&BakedAnimationSheet> {
        self.animation_sheet.as_ref()
    }

    pub fn registrar(&self) -> Registrar {
        Registrar {
            sender: self.sender.clone(),
        }
    }

    /// Validates the draw resources and queues the instance for the next
    /// tick. A rejected join allocates nothing.
    pub fn join(
        &mut self,
        owner: OwnerHandle,
        key: ResourceKey,
        transform: Mat4,
    ) -> Result<InstanceHandle, JoinError> {
        self.join_with(owner, key, transform, InstanceKind::Static, false)
    }

    pub fn join_animated(
        &mut self,
        owner: OwnerHandle,
        key: ResourceKey,
        transform: Mat4,
        clip: ClipId,
        uv_index: f32,
    ) -> Result<InstanceHandle, JoinError> {
        self.join_with(
            owner,
            key,
            transform,
            InstanceKind::Animated { clip, uv_index },
            false,
        )
    }

    /// Instances not flagged `enable_in_low_end` are rejected while the
    /// configured shader LOD is at or below the low-end threshold.
    pub fn join_with(
        &mut self,
        owner: OwnerHandle,
        key: ResourceKey,
        transform: Mat4,
        kind: InstanceKind,
        enable_in_low_end: bool,
    ) -> Result<InstanceHandle, JoinError> {
        let local_bounds = self
            .check_low_end(enable_in_low_end)
            .and_then(|_| self.catalog.resolve(&key))
            .inspect_err(|error| {
                log::warn!("Rejected join from {:?}: {}", owner, error);
            })?;

        let handle = self
            .instances
            .insert(InstanceRecord::new(owner, key, kind, local_bounds, transform));
        self.queue(Registration::Attach(handle));

        Ok(handle)
    }

    fn check_low_end(&self, enable_in_low_end: bool) -> Result<(), JoinError> {
        let shader_lod = self.config.maximum_shader_lod;

        if shader_lod <= self.config.low_end_lod_threshold && !enable_in_low_end {
            return Err(JoinError::LowEndDisabled(shader_lod));
        }

        Ok(())
    }

    pub fn quit(&mut self, handle: InstanceHandle) -> Result<(), EngineError> {
        if !self.instances.contains_key(handle) {
            return Err(EngineError::UnknownInstance(handle));
        }

        self.queue(Registration::Quit(handle));
        Ok(())
    }

    fn queue(&mut self, registration: Registration) {
        self.pending.push_back(registration);
        if self.phase == FramePhase::Idle {
            self.phase = FramePhase::Registering;
        }
    }

    /// Caches a new transform and refreshes the bounding sphere.
    pub fn update_transform(
        &mut self,
        handle: InstanceHandle,
        transform: Mat4,
    ) -> Result<(), EngineError> {
        let record = self
            .instances
            .get_mut(handle)
            .ok_or(EngineError::UnknownInstance(handle))?;
        record.transform = transform;

        if let Some(attachment) = record.attachment {
            let sphere = BoundingSphere::from_local_bounds(&transform, &record.local_bounds);
            self.bounding.update(attachment.bounding_slot, sphere);
            if let Some(group) = self.groups.get_mut(attachment.group) {
                group.update_transform(attachment.slot, transform);
            }
        }

        Ok(())
    }

    /// Hiding overrides the cull result until the instance is made visible
    /// again.
    pub fn set_visible(&mut self, handle: InstanceHandle, visible: bool) -> Result<(), EngineError> {
        let record = self
            .instances
            .get_mut(handle)
            .ok_or(EngineError::UnknownInstance(handle))?;
        record.hidden = !visible;

        if let Some(attachment) = record.attachment {
            if let Some(group) = self.groups.get_mut(attachment.group) {
                group.set_hidden(attachment.slot, !visible);
            }
        }

        Ok(())
    }

    pub fn set_sync_transform(
        &mut self,
        handle: InstanceHandle,
        sync: bool,
    ) -> Result<(), EngineError> {
        let record = self
            .instances
            .get_mut(handle)
            .ok_or(EngineError::UnknownInstance(handle))?;
        record.sync_transform = sync;
        Ok(())
    }

    /// Pulls the transform from the owner for the next `frames` ticks.
    pub fn request_transform_sync(
        &mut self,
        handle: InstanceHandle,
        frames: u32,
    ) -> Result<(), EngineError> {
        let record = self
            .instances
            .get_mut(handle)
            .ok_or(EngineError::UnknownInstance(handle))?;
        record.sync_delay = record.sync_delay.max(frames);
        Ok(())
    }

    pub fn assign_region(
        &mut self,
        handle: InstanceHandle,
        region: Option<RegionId>,
    ) -> Result<(), EngineError> {
        let record = self
            .instances
            .get_mut(handle)
            .ok_or(EngineError::UnknownInstance(handle))?;
        record.region = region;

        if let Some(attachment) = record.attachment {
            self.bounding.set_region(attachment.bounding_slot, region);
        }

        Ok(())
    }

    pub fn get_or_create_group(&mut self, key: ResourceKey) -> GroupId {
        if let Some(id) = self.group_ids.get(&key) {
            return *id;
        }

        let id = self.groups.alloc(ResourceGroup::new(key));
        self.group_ids.insert(key, id);
        log::info!("Created resource group {} for {:?}", id.index(), key);
        id
    }

    pub fn group_id(&self, key: &ResourceKey) -> Option<GroupId> {
        self.group_ids.get(key).copied()
    }

    pub fn group(&self, id: GroupId) -> Option<&ResourceGroup> {
        self.groups.get(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &ResourceGroup)> {
        self.groups.iter()
    }

    pub fn configure_lod_bands(
        &mut self,
        group: GroupId,
        bands: Vec<LodBand>,
    ) -> Result<(), EngineError> {
        let group = self
            .groups
            .get_mut(group)
            .ok_or(EngineError::UnknownGroup)?;
        group.set_lod_bands(bands)?;
        log::info!(
            "Configured {} LOD bands for {:?}",
            group.lod_bands().len(),
            group.key()
        );
        Ok(())
    }

    pub fn set_culling_region(&mut self, id: RegionId, matrix: Mat4, half_extents: Vec3) {
        self.regions.set(id, matrix, half_extents);
    }

    pub fn remove_culling_region(&mut self, id: RegionId) -> bool {
        self.regions.remove(id)
    }

    pub fn set_batch_limit(&mut self, batch_limit: usize) -> Result<(), EngineError> {
        if batch_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_limit must be at least 1".into(),
            ));
        }

        if batch_limit != self.config.batch_limit {
            self.config.batch_limit = batch_limit;
            self.mark_all_dirty();
        }

        Ok(())
    }

    pub fn set_visible_probability(&mut self, probability: f32) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(EngineError::InvalidConfig(format!(
                "visible_probability {} is outside [0, 1]",
                probability
            )));
        }

        if probability != self.config.visible_probability {
            self.config.visible_probability = probability;
            self.mark_all_dirty();
        }

        Ok(())
    }

    pub fn set_culling_enabled(&mut self, enabled: bool) {
        if enabled != self.config.enable_culling {
            self.config.enable_culling = enabled;
            self.mark_all_dirty();
        }
    }

    fn mark_all_dirty(&mut self) {
        for (_, group) in self.groups.iter_mut() {
            group.mark_dirty();
        }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn pending_registrations(&self) -> usize {
        self.pending.len() + self.receiver.len()
    }

    pub fn bounding_registry(&self) -> &BoundingRegistry {
        &self.bounding
    }

    pub fn culling_regions(&self) -> &CullingRegions {
        &self.regions
    }

    pub fn owner(&self, handle: InstanceHandle) -> Option<OwnerHandle> {
        self.instances.get(handle).map(|record| record.owner)
    }

    pub fn slot(&self, handle: InstanceHandle) -> Option<usize> {
        self.attachment(handle).map(|attachment| attachment.slot)
    }

    pub fn bounding_slot(&self, handle: InstanceHandle) -> Option<usize> {
        self.attachment(handle)
            .map(|attachment| attachment.bounding_slot)
    }

    /// Visibility after the last tick, or `None` until the instance is
    /// attached.
    pub fn is_visible(&self, handle: InstanceHandle) -> Option<bool> {
        let attachment = self.attachment(handle)?;
        self.groups
            .get(attachment.group)?
            .member(attachment.slot)
            .map(Member::is_visible)
    }

    fn attachment(&self, handle: InstanceHandle) -> Option<Attachment> {
        self.instances.get(handle)?.attachment
    }

    /// Runs one frame: applies queued registrations, culls, assigns LOD
    /// bands, rebuilds dirty draw lists and submits every batch.
    pub fn tick(&mut self, input: &FrameInput<'_>, submitter: &mut dyn DrawSubmitter) {
        self.stats = FrameStats {
            frame: self.stats.frame + 1,
            ..FrameStats::default()
        };

        self.phase = FramePhase::Registering;
        self.apply_registrations();
        self.sync_transforms(input.transform_source);

        self.phase = FramePhase::Culling;
        self.cull(input);

        self.phase = FramePhase::Classifying;
        let camera_position = input.camera_position;
        let min_slots_per_task = self.config.cull_chunk_size;
        self.groups
            .par_iter_mut()
            .for_each(|(_, group)| group.classify(camera_position, min_slots_per_task));

        self.phase = FramePhase::Building;
        let batch_limit = self.config.batch_limit;
        // Thinning only applies to the culled path
        let visible_probability = if self.config.enable_culling {
            self.config.visible_probability
        } else {
            1.0
        };
        let sheet = self.animation_sheet.as_ref();
        self.stats.groups_rebuilt = self
            .groups
            .par_iter_mut()
            .map(|(_, group)| group.rebuild_if_dirty(batch_limit, visible_probability, sheet))
            .filter(|rebuilt| *rebuilt)
            .count();

        self.phase = FramePhase::Submitting;
        self.submit(submitter);
        self.animated_time += input.delta_time;

        self.phase = FramePhase::Idle;

        log::debug!("{:?}", self.stats);
    }

    fn apply_registrations(&mut self) {
        while let Some(registration) = self.pending.pop_front() {
            self.apply(registration);
        }

        while let Ok(registration) = self.receiver.try_recv() {
            self.apply(registration);
        }
    }

    fn apply(&mut self, registration: Registration) {
        let result = match registration {
            Registration::Attach(handle) => {
                self.attach(handle);
                Ok(())
            }
            Registration::Quit(handle) => self.detach(handle),
            Registration::UpdateTransform(handle, transform) => {
                self.update_transform(handle, transform)
            }
            Registration::SetVisible(handle, visible) => self.set_visible(handle, visible),
        };

        if let Err(error) = result {
            log::warn!("Dropped queued registration: {}", error);
        }
    }

    fn attach(&mut self, handle: InstanceHandle) {
        // Quit before the join was applied
        let Some(record) = self.instances.get(handle) else {
            return;
        };

        if record.attachment.is_some() {
            return;
        }

        let (key, kind, transform, local_bounds, region, hidden) = (
            record.key,
            record.kind,
            record.transform,
            record.local_bounds,
            record.region,
            record.hidden,
        );

        let group_id = self.get_or_create_group(key);
        let sphere = BoundingSphere::from_local_bounds(&transform, &local_bounds);
        let bounding_slot = self
            .bounding
            .insert(sphere, handle, region, kind.is_animated());

        let mut member = Member::new(handle, kind);
        member.hidden = hidden;
        let slot = self.groups[group_id].join(member, transform);

        if let Some(record) = self.instances.get_mut(handle) {
            record.attachment = Some(Attachment {
                group: group_id,
                slot,
                bounding_slot,
            });
        }
    }

    fn detach(&mut self, handle: InstanceHandle) -> Result<(), EngineError> {
        let record = self
            .instances
            .remove(handle)
            .ok_or(EngineError::UnknownInstance(handle))?;

        let Some(attachment) = record.attachment else {
            return Ok(());
        };

        let moved = self
            .groups
            .get_mut(attachment.group)
            .and_then(|group| group.quit(attachment.slot));
        if let Some(moved) = moved.and_then(|moved| self.instances.get_mut(moved)) {
            if let Some(moved_attachment) = moved.attachment.as_mut() {
                moved_attachment.slot = attachment.slot;
            }
        }

        let moved = self.bounding.remove(attachment.bounding_slot);
        if let Some(moved) = moved.and_then(|moved| self.instances.get_mut(moved)) {
            if let Some(moved_attachment) = moved.attachment.as_mut() {
                moved_attachment.bounding_slot = attachment.bounding_slot;
            }
        }

        Ok(())
    }

    fn sync_transforms(&mut self, source: Option<&dyn TransformSource>) {
        let Some(source) = source.filter(|_| self.config.sync_transforms) else {
            return;
        };

        // A pending request is only used up by a frame that delivered a matrix
        let updates: Vec<(InstanceHandle, Mat4)> = self
            .instances
            .iter_mut()
            .filter(|(_, record)| record.attachment.is_some() && record.wants_sync())
            .filter_map(|(handle, record)| {
                let transform = source.world_matrix(record.owner)?;
                record.sync_delay = record.sync_delay.saturating_sub(1);
                Some((handle, transform))
            })
            .collect();

        for (handle, transform) in updates {
            if let Err(error) = self.update_transform(handle, transform) {
                log::warn!("Transform sync failed: {}", error);
            }
        }
    }

    fn cull(&mut self, input: &FrameInput<'_>) {
        let culling = self.config.enable_culling;

        if culling {
            let detail = input
                .view_projection
                .map(|view_projection| DetailCull::new(view_projection, input.camera_up));

            self.regions.evaluate(&input.frustum);
            self.bounding.cull(
                &input.frustum,
                self.regions.results(),
                detail.as_ref(),
                self.config.cull_chunk_size,
            );
        }

        self.stats.total = self.bounding.len();

        for (owner, result) in izip!(self.bounding.owners(), self.bounding.results()) {
            let visible = !culling || result.is_visible();

            if culling {
                match result {
                    CullResult::RegionOutside => self.stats.region_culled += 1,
                    CullResult::DetailOutside => self.stats.detail_culled += 1,
                    _ => {}
                }
            }

            let Some(attachment) = self.instances.get(*owner).and_then(|record| record.attachment)
            else {
                continue;
            };

            if let Some(group) = self.groups.get_mut(attachment.group) {
                group.set_cull_visible(attachment.slot, visible);
                if group.member(attachment.slot).is_some_and(Member::is_visible) {
                    self.stats.visible += 1;
                }
            }
        }
    }

    fn submit(&mut self, submitter: &mut dyn DrawSubmitter) {
        let sheet = self.animation_sheet.as_ref();
        let frame = sheet.map_or(0, |sheet| sheet.frame_at(self.animated_time));
        let scratch = &mut self.scratch;

        submitter.begin_frame();

        for (_, group) in self.groups.iter() {
            for (band, chunks) in group.draw_list().bands().iter().enumerate() {
                for chunk in chunks {
                    let instances = match sheet {
                        Some(sheet) if chunk.has_animation => {
                            scratch.clear();
                            scratch.extend(izip!(&chunk.instances, &chunk.animation).map(
                                |(instance, span)| {
                                    let mut instance = *instance;
                                    if span.is_animated() {
                                        instance.animation_row = sheet.row_for(*span, frame) as f32;
                                    }
                                    instance
                                },
                            ));
                            scratch.as_slice()
                        }
                        _ => chunk.instances.as_slice(),
                    };

                    submitter.submit(DrawBatch {
                        key: group.key(),
                        band,
                        instances,
                    });

                    self.stats.batches += 1;
                    self.stats.instances_submitted += instances.len();
                }
            }
        }

        submitter.end_frame();
    }
}
