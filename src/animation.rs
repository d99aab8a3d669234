use glam::Vec4;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u32);

/// Location of one clip inside the baked matrix table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BakedClip {
    pub clip: ClipId,
    pub matrix_start_index: u32,
    /// Number of rows the clip spans, `frames * bone_count`.
    pub matrix_count: u32,
}

/// Rows of a clip an instance plays. A zero count marks an instance that is
/// not animated.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationSpan {
    pub start: u32,
    pub count: u32,
}

impl AnimationSpan {
    pub fn is_animated(&self) -> bool {
        self.count > 0
    }
}

/// Top three rows of an affine bone matrix.
pub type BoneRows = [Vec4; 3];

/// Bone matrices baked per clip and frame by the asset pipeline. The table is
/// opaque to the engine apart from its indexing scheme.
#[derive(Debug, Clone)]
pub struct BakedAnimationSheet {
    frame_rate: u32,
    bone_count: u32,
    clips: Vec<BakedClip>,
    matrices: Vec<BoneRows>,
}

impl BakedAnimationSheet {
    pub fn new(frame_rate: u32, bone_count: u32, clips: Vec<BakedClip>, matrices: Vec<BoneRows>) -> Self {
        Self {
            frame_rate,
            bone_count: bone_count.max(1),
            clips,
            matrices,
        }
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn bone_count(&self) -> u32 {
        self.bone_count
    }

    pub fn clips(&self) -> &[BakedClip] {
        &self.clips
    }

    pub fn matrices(&self) -> &[BoneRows] {
        &self.matrices
    }

    /// Clips missing from the sheet play a single row starting at 0.
    pub fn span(&self, clip: ClipId) -> AnimationSpan {
        self.clips
            .iter()
            .find(|baked| baked.clip == clip)
            .map(|baked| AnimationSpan {
                start: baked.matrix_start_index,
                count: baked.matrix_count.max(1),
            })
            .unwrap_or(AnimationSpan { start: 0, count: 1 })
    }

    pub fn frame_at(&self, time: f32) -> u32 {
        (time.max(0.0) * self.frame_rate as f32) as u32
    }

    pub fn row_for(&self, span: AnimationSpan, frame: u32) -> u32 {
        let count = u64::from(span.count.max(1));
        let offset = (u64::from(frame) * u64::from(self.bone_count)) % count;
        span.start + offset as u32
    }
}
