mod catalog;
mod draw_list;
mod instance;
mod instance_data;
mod resource_group;
mod resource_key;

pub use catalog::{ResourceCatalog, SurfaceInfo};
pub use draw_list::{passes_thinning, Chunk, DrawList};
pub use instance::{Attachment, InstanceHandle, InstanceKind, InstanceRecord, OwnerHandle};
pub use instance_data::InstanceData;
pub use resource_group::{Member, ResourceGroup};
pub use resource_key::{GeometryId, ResourceKey, ShadowCastingMode, SurfaceId};

pub type GroupId = id_arena::Id<ResourceGroup>;
