use thiserror::Error;

use crate::instancing::{GeometryId, InstanceHandle, SurfaceId};

/// Reasons a join is rejected. A rejected join leaves no registration
/// state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("geometry {0:?} is not registered")]
    MissingGeometry(GeometryId),
    #[error("surface {0:?} is not registered")]
    MissingSurface(SurfaceId),
    #[error("surface {0:?} does not support instancing")]
    InstancingDisabled(SurfaceId),
    #[error("shader LOD {0} is low-end and the instance is not enabled for low-end devices")]
    LowEndDisabled(u32),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown instance {0:?}")]
    UnknownInstance(InstanceHandle),
    #[error("no resource group for the given key")]
    UnknownGroup,
    #[error("invalid LOD bands: {0}")]
    InvalidLodBands(String),
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}
