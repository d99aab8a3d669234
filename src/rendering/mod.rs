mod instance_storage_buffer;
mod wgpu_submitter;

pub use instance_storage_buffer::InstanceStorageBuffer;
pub use wgpu_submitter::{FrameBatches, GpuMesh, InstanceBatch, WgpuBatchSubmitter};

use crate::instancing::{InstanceData, ResourceKey};

/// One batched draw: at most the configured batch limit of instances of a
/// single resource key and LOD band.
#[derive(Debug, Clone, Copy)]
pub struct DrawBatch<'a> {
    pub key: &'a ResourceKey,
    pub band: usize,
    pub instances: &'a [InstanceData],
}

/// Receives the batches of a frame, in group then band then chunk order.
pub trait DrawSubmitter {
    fn begin_frame(&mut self) {}

    fn submit(&mut self, batch: DrawBatch<'_>);

    fn end_frame(&mut self) {}
}
