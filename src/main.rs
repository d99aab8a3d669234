use anyhow::Result;
use glam::{Mat4, Vec3, Vec4};

use crowdgine::{
    animation::{BakedAnimationSheet, BakedClip, ClipId},
    culling::{LodBand, RegionId},
    instancing::{GeometryId, OwnerHandle, ResourceKey, SurfaceId, SurfaceInfo},
    math::bounds::AABB,
    rendering::{DrawBatch, DrawSubmitter},
    EngineConfig, FrameInput, InstancingEngine,
};

const CROWD_SIDE: u32 = 100;
const SPACING: f32 = 2.0;
const FRAMES: u32 = 240;
const BONE_COUNT: u32 = 4;

/// Counts what would have been drawn
#[derive(Default)]
struct StatsSubmitter {
    batches: usize,
    instances: usize,
    largest_batch: usize,
}

impl DrawSubmitter for StatsSubmitter {
    fn begin_frame(&mut self) {
        *self = Self::default();
    }

    fn submit(&mut self, batch: DrawBatch<'_>) {
        self.batches += 1;
        self.instances += batch.instances.len();
        self.largest_batch = self.largest_batch.max(batch.instances.len());
    }
}

fn demo_sheet() -> BakedAnimationSheet {
    let idle_frames = 30;
    let walk_frames = 24;
    let rows = (idle_frames + walk_frames) * BONE_COUNT;

    let clips = vec![
        BakedClip {
            clip: ClipId(0),
            matrix_start_index: 0,
            matrix_count: idle_frames * BONE_COUNT,
        },
        BakedClip {
            clip: ClipId(1),
            matrix_start_index: idle_frames * BONE_COUNT,
            matrix_count: walk_frames * BONE_COUNT,
        },
    ];

    BakedAnimationSheet::new(
        30,
        BONE_COUNT,
        clips,
        vec![[Vec4::X, Vec4::Y, Vec4::Z]; rows as usize],
    )
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let mut engine = InstancingEngine::new(config)?;

    let key = ResourceKey::new(GeometryId(0), SurfaceId(0));
    engine.register_geometry(
        key.geometry,
        AABB::new(Vec3::new(-0.4, 0.0, -0.4), Vec3::new(0.4, 1.8, 0.4)),
    );
    engine.register_surface(key.surface, SurfaceInfo::default());
    engine.set_animation_sheet(Some(demo_sheet()));

    let group = engine.get_or_create_group(key);
    engine.configure_lod_bands(
        group,
        vec![LodBand::new(0.0, 40.0), LodBand::new(40.0, 150.0)],
    )?;

    let half_size = CROWD_SIDE as f32 * SPACING * 0.5;

    // One culling box per quadrant of the crowd
    for quadrant in 0..4u32 {
        let x_sign = if quadrant % 2 == 0 { -1.0 } else { 1.0 };
        let z_sign = if quadrant < 2 { -1.0 } else { 1.0 };
        let center = Vec3::new(x_sign * half_size * 0.5, 1.0, z_sign * half_size * 0.5);
        engine.set_culling_region(
            RegionId(quadrant),
            Mat4::from_translation(center),
            Vec3::new(half_size * 0.5 + 1.0, 2.0, half_size * 0.5 + 1.0),
        );
    }

    for z in 0..CROWD_SIDE {
        for x in 0..CROWD_SIDE {
            let position = Vec3::new(
                x as f32 * SPACING - half_size,
                0.0,
                z as f32 * SPACING - half_size,
            );
            let handle = engine.join_animated(
                OwnerHandle((z * CROWD_SIDE + x) as u64),
                key,
                Mat4::from_translation(position),
                ClipId((x + z) % 2),
                ((x * 7 + z) % 4) as f32,
            )?;

            let quadrant = u32::from(position.x >= 0.0) + 2 * u32::from(position.z >= 0.0);
            engine.assign_region(handle, Some(RegionId(quadrant)))?;
        }
    }

    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 16.0 / 9.0, 0.1, 200.0);
    let mut submitter = StatsSubmitter::default();

    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.025;
        let eye = Vec3::new(angle.cos() * 70.0, 25.0, angle.sin() * 70.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);

        let input = FrameInput::from_camera(eye, Vec3::Y, projection * view, 1.0 / 60.0);
        engine.tick(&input, &mut submitter);

        if frame % 60 == 0 {
            let stats = engine.last_frame_stats();
            log::info!(
                "Frame {}: {}/{} visible, {} region culled, {} batches (largest {}), {} instances, {} groups rebuilt",
                stats.frame,
                stats.visible,
                stats.total,
                stats.region_culled,
                submitter.batches,
                submitter.largest_batch,
                submitter.instances,
                stats.groups_rebuilt
            );
        }
    }

    Ok(())
}
