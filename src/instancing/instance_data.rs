use glam::Mat4;

/// Per-instance data as uploaded for drawing. This should match the same
/// structure defined in WGSL.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    pub model_matrix: Mat4,
    pub uv_index: f32,
    /// First row of the current frame in the baked animation table, or 0 for
    /// static instances.
    pub animation_row: f32,
    _padding: [f32; 2],
}

impl InstanceData {
    pub fn new(model_matrix: Mat4, uv_index: f32) -> Self {
        Self {
            model_matrix,
            uv_index,
            animation_row: 0.0,
            _padding: [0.0; 2],
        }
    }
}
