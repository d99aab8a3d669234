use glam::Mat4;
use itertools::izip;

use crate::{
    animation::{AnimationSpan, BakedAnimationSheet},
    instancing::{InstanceData, InstanceKind, Member},
};

/// One draw call worth of instances. `animation` runs parallel to
/// `instances`; rows are resolved per frame at submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub instances: Vec<InstanceData>,
    pub animation: Vec<AnimationSpan>,
    pub has_animation: bool,
}

impl Chunk {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            instances: Vec::with_capacity(capacity),
            animation: Vec::with_capacity(capacity),
            has_animation: false,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn push(&mut self, instance: InstanceData, span: AnimationSpan) {
        self.has_animation |= span.is_animated();
        self.instances.push(instance);
        self.animation.push(span);
    }
}

/// Compacted visible transforms of a resource group, per LOD band, split
/// into chunks of at most the batch limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    bands: Vec<Vec<Chunk>>,
}

impl DrawList {
    pub fn bands(&self) -> &[Vec<Chunk>] {
        &self.bands
    }

    pub fn chunks(&self, band: usize) -> &[Chunk] {
        self.bands.get(band).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn visible_count(&self) -> usize {
        self.bands.iter().flatten().map(Chunk::len).sum()
    }

    pub fn chunk_count(&self) -> usize {
        self.bands.iter().map(Vec::len).sum()
    }

    /// Scans members in slot order and packs every visible one into its band.
    /// All chunks are full except possibly the last of each band.
    pub fn rebuild(
        &mut self,
        members: &[Member],
        transforms: &[Mat4],
        band_count: usize,
        limit: usize,
        visible_probability: f32,
        sheet: Option<&BakedAnimationSheet>,
    ) {
        let limit = limit.max(1);

        self.bands.clear();
        self.bands.resize_with(band_count.max(1), Vec::new);

        for (member, transform) in izip!(members, transforms) {
            if !member.is_visible() {
                continue;
            }

            let Some(chunks) = member.band.and_then(|band| self.bands.get_mut(band)) else {
                continue;
            };

            if !passes_thinning(transform, visible_probability) {
                continue;
            }

            let span = match (member.kind, sheet) {
                (InstanceKind::Animated { clip, .. }, Some(sheet)) => sheet.span(clip),
                _ => AnimationSpan::default(),
            };

            let needs_chunk = chunks.last().map_or(true, |chunk| chunk.len() >= limit);
            if needs_chunk {
                chunks.push(Chunk::with_capacity(limit));
            }

            if let Some(chunk) = chunks.last_mut() {
                chunk.push(InstanceData::new(*transform, member.kind.uv_index()), span);
            }
        }
    }
}

/// Deterministic thinning keyed on the translation of `transform`. The same
/// position always gets the same answer for a given probability.
pub fn passes_thinning(transform: &Mat4, visible_probability: f32) -> bool {
    if visible_probability >= 1.0 {
        return true;
    }

    let position = transform.w_axis;
    let hash = ((position.x * 17.0 + position.y * 42.0 + position.z * 61.0) * 100000.0).sin() * 0.5
        + 0.5;

    hash < visible_probability
}
