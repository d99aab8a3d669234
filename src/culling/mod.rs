mod bounding_registry;
mod cull_stage;
mod lod;
mod region;

pub use bounding_registry::BoundingRegistry;
pub use cull_stage::{cull_slot, CullResult, DetailCull};
pub use lod::{classify_band, validate_bands, LodBand};
pub use region::{classify_region, CullingRegions, RegionId, RegionResults, RegionVisibility};
