use glam::Mat4;
use slotmap::new_key_type;

use crate::{
    animation::ClipId,
    culling::RegionId,
    instancing::{GroupId, ResourceKey},
    math::bounds::AABB,
};

new_key_type! {
    /// Returned from a join; valid until the instance quits.
    pub struct InstanceHandle;
}

/// Opaque identity of the scene node that owns an instance. The engine only
/// hands it back to a `TransformSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerHandle(pub u64);

#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub enum InstanceKind {
    /// Plain mesh instance
    #[default]
    Static,
    /// Crowd member driven by a baked animation sheet
    Animated { clip: ClipId, uv_index: f32 },
}

impl InstanceKind {
    pub fn is_animated(&self) -> bool {
        matches!(self, InstanceKind::Animated { .. })
    }

    pub fn uv_index(&self) -> f32 {
        match self {
            InstanceKind::Static => 0.0,
            InstanceKind::Animated { uv_index, .. } => *uv_index,
        }
    }
}

/// Where an attached instance lives in its group's arena and in the
/// bounding registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub group: GroupId,
    pub slot: usize,
    pub bounding_slot: usize,
}

#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub owner: OwnerHandle,
    pub key: ResourceKey,
    pub kind: InstanceKind,
    pub local_bounds: AABB,
    /// Last transform pushed by the owner.
    pub transform: Mat4,
    pub region: Option<RegionId>,
    /// Hidden by the owner regardless of culling.
    pub hidden: bool,
    pub sync_transform: bool,
    /// Frames left during which the transform is pulled from the owner.
    pub sync_delay: u32,
    /// `None` until the join is applied at the next registration window.
    pub attachment: Option<Attachment>,
}

impl InstanceRecord {
    pub fn new(
        owner: OwnerHandle,
        key: ResourceKey,
        kind: InstanceKind,
        local_bounds: AABB,
        transform: Mat4,
    ) -> Self {
        Self {
            owner,
            key,
            kind,
            local_bounds,
            transform,
            region: None,
            hidden: false,
            sync_transform: false,
            sync_delay: 0,
            attachment: None,
        }
    }

    pub fn wants_sync(&self) -> bool {
        self.sync_transform || self.sync_delay > 0
    }
}
