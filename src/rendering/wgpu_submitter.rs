use std::{collections::HashMap, ops::Range};

use crate::{
    instancing::{InstanceData, ResourceKey},
    rendering::{DrawBatch, DrawSubmitter, InstanceStorageBuffer},
};

/// GPU resources drawn for one resource key and LOD band. The pipeline must
/// read instances from the storage buffer bound at `INSTANCE_BIND_GROUP`.
pub struct GpuMesh {
    pub pipeline: wgpu::RenderPipeline,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
}

/// A range of the frame's instance buffer drawn with one call
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceBatch {
    pub key: ResourceKey,
    pub band: usize,
    pub start_index: u32,
    pub instance_count: u32,
}

impl InstanceBatch {
    pub fn instance_range(&self) -> Range<u32> {
        self.start_index..(self.start_index + self.instance_count)
    }
}

/// The instances of every batch of a frame laid out back to back, in
/// submission order.
#[derive(Debug, Default)]
pub struct FrameBatches {
    staged: Vec<InstanceData>,
    batches: Vec<InstanceBatch>,
}

impl FrameBatches {
    pub fn clear(&mut self) {
        self.staged.clear();
        self.batches.clear();
    }

    /// Empty batches are dropped.
    pub fn push(&mut self, batch: DrawBatch<'_>) {
        if batch.instances.is_empty() {
            return;
        }

        self.batches.push(InstanceBatch {
            key: *batch.key,
            band: batch.band,
            start_index: self.staged.len() as u32,
            instance_count: batch.instances.len() as u32,
        });
        self.staged.extend_from_slice(batch.instances);
    }

    pub fn staged(&self) -> &[InstanceData] {
        &self.staged
    }

    pub fn batches(&self) -> &[InstanceBatch] {
        &self.batches
    }
}

/// Collects the batches of a frame into one storage buffer and replays them
/// as instanced draws.
pub struct WgpuBatchSubmitter {
    device: wgpu::Device,
    queue: wgpu::Queue,
    storage_buffer: InstanceStorageBuffer,
    meshes: HashMap<(ResourceKey, usize), GpuMesh>,
    frame: FrameBatches,
}

impl WgpuBatchSubmitter {
    pub const INSTANCE_BIND_GROUP: u32 = 1;

    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let storage_buffer =
            InstanceStorageBuffer::new(&device, InstanceStorageBuffer::INITIAL_CAPACITY);

        Self {
            device,
            queue,
            storage_buffer,
            meshes: HashMap::new(),
            frame: FrameBatches::default(),
        }
    }

    pub fn register_mesh(&mut self, key: ResourceKey, band: usize, mesh: GpuMesh) {
        self.meshes.insert((key, band), mesh);
    }

    pub fn instance_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        self.storage_buffer.bind_group_layout()
    }

    pub fn batches(&self) -> &[InstanceBatch] {
        self.frame.batches()
    }

    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_bind_group(
            Self::INSTANCE_BIND_GROUP,
            self.storage_buffer.bind_group(),
            &[],
        );

        for batch in self.frame.batches() {
            let Some(mesh) = self.meshes.get(&(batch.key, batch.band)) else {
                continue;
            };

            render_pass.set_pipeline(&mesh.pipeline);
            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..mesh.num_indices, 0, batch.instance_range());
        }
    }
}

impl DrawSubmitter for WgpuBatchSubmitter {
    fn begin_frame(&mut self) {
        self.frame.clear();
    }

    fn submit(&mut self, batch: DrawBatch<'_>) {
        self.frame.push(batch);
    }

    fn end_frame(&mut self) {
        let staged = self.frame.staged();
        self.storage_buffer
            .ensure_capacity(&self.device, staged.len() as u64);
        self.storage_buffer
            .write_instances_at_offset(&self.queue, staged, 0);
    }
}
