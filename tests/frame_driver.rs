use std::collections::HashMap;

use glam::{Mat4, Vec3, Vec4};

use crowdgine::{
    animation::{BakedAnimationSheet, BakedClip, ClipId},
    culling::{LodBand, RegionId},
    instancing::{
        GeometryId, InstanceData, InstanceHandle, InstanceKind, OwnerHandle, ResourceKey, SurfaceId,
        SurfaceInfo,
    },
    math::{bounds::AABB, frustum::Frustum},
    rendering::{DrawBatch, DrawSubmitter},
    EngineConfig, EngineError, FrameInput, FramePhase, InstancingEngine, JoinError,
    TransformSource,
};

struct RecordedBatch {
    key: ResourceKey,
    band: usize,
    instances: Vec<InstanceData>,
}

#[derive(Default)]
struct RecordingSubmitter {
    frames: usize,
    batches: Vec<RecordedBatch>,
}

impl RecordingSubmitter {
    fn sizes(&self) -> Vec<usize> {
        self.batches.iter().map(|batch| batch.instances.len()).collect()
    }

    fn instance_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.instances.len()).sum()
    }
}

impl DrawSubmitter for RecordingSubmitter {
    fn begin_frame(&mut self) {
        self.frames += 1;
        self.batches.clear();
    }

    fn submit(&mut self, batch: DrawBatch<'_>) {
        self.batches.push(RecordedBatch {
            key: *batch.key,
            band: batch.band,
            instances: batch.instances.to_vec(),
        });
    }
}

fn key() -> ResourceKey {
    ResourceKey::new(GeometryId(0), SurfaceId(0))
}

fn engine_with(config: EngineConfig) -> InstancingEngine {
    let mut engine = InstancingEngine::new(config).unwrap();
    engine.register_geometry(GeometryId(0), AABB::new(Vec3::splat(-0.5), Vec3::splat(0.5)));
    engine.register_geometry(GeometryId(1), AABB::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
    engine.register_surface(SurfaceId(0), SurfaceInfo::default());
    engine.register_surface(
        SurfaceId(1),
        SurfaceInfo {
            supports_instancing: false,
        },
    );
    engine
}

fn engine() -> InstancingEngine {
    engine_with(EngineConfig::default())
}

fn view_projection() -> Mat4 {
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    projection * view
}

fn input<'a>() -> FrameInput<'a> {
    FrameInput::new(
        Vec3::ZERO,
        Vec3::Y,
        Frustum::from_view_projection(view_projection()),
        0.0,
    )
}

fn at(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, y, z))
}

fn join_many(engine: &mut InstancingEngine, count: usize, transform: Mat4) -> Vec<InstanceHandle> {
    (0..count)
        .map(|index| {
            engine
                .join(OwnerHandle(index as u64), key(), transform)
                .unwrap()
        })
        .collect()
}

#[test]
fn instances_outside_the_frustum_issue_no_batches() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    let handles = join_many(&mut engine, 2000, at(0.0, 0.0, 50.0));

    engine.tick(&input(), &mut submitter);

    assert!(handles
        .iter()
        .all(|handle| engine.is_visible(*handle) == Some(false)));
    assert!(submitter.batches.is_empty());
    assert_eq!(engine.last_frame_stats().total, 2000);
    assert_eq!(engine.last_frame_stats().visible, 0);
}

#[test]
fn visible_instances_split_at_the_batch_limit() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    join_many(&mut engine, 1025, at(0.0, 0.0, -10.0));

    engine.tick(&input(), &mut submitter);

    assert_eq!(submitter.sizes(), vec![1023, 2]);
    assert!(submitter.batches.iter().all(|batch| batch.key == key()));
    assert_eq!(engine.last_frame_stats().batches, 2);
}

#[test]
fn lowering_the_batch_limit_repacks() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    join_many(&mut engine, 10, at(0.0, 0.0, -10.0));
    engine.tick(&input(), &mut submitter);

    engine.set_batch_limit(4).unwrap();
    engine.tick(&input(), &mut submitter);

    assert_eq!(submitter.sizes(), vec![4, 4, 2]);
    assert!(matches!(
        engine.set_batch_limit(0),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn quit_moves_the_last_instance_into_the_hole() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    let handles = join_many(&mut engine, 3, at(0.0, 0.0, -10.0));
    engine.tick(&input(), &mut submitter);
    assert_eq!(engine.slot(handles[2]), Some(2));

    engine.quit(handles[0]).unwrap();
    engine.tick(&input(), &mut submitter);

    assert_eq!(engine.slot(handles[2]), Some(0));
    assert_eq!(engine.bounding_slot(handles[2]), Some(0));
    assert_eq!(engine.bounding_registry().owner(0), Some(handles[2]));
    assert_eq!(engine.slot(handles[1]), Some(1));
    assert_eq!(engine.slot(handles[0]), None);
    assert_eq!(submitter.instance_count(), 2);
    assert_eq!(
        engine.quit(handles[0]),
        Err(EngineError::UnknownInstance(handles[0]))
    );
}

#[test]
fn back_references_survive_mixed_joins_and_quits() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    let other = ResourceKey::new(GeometryId(1), SurfaceId(0));
    let mut live = Vec::new();

    for round in 0..6u64 {
        for index in 0..7u64 {
            let key = if index % 2 == 0 { key() } else { other };
            let transform = at(index as f32, 0.0, -20.0);
            live.push(engine.join(OwnerHandle(round * 10 + index), key, transform).unwrap());
        }

        // Quit every third live instance, oldest first
        let mut index = 0;
        live.retain(|handle| {
            index += 1;
            if index % 3 == 0 {
                engine.quit(*handle).unwrap();
                false
            } else {
                true
            }
        });

        engine.tick(&input(), &mut submitter);

        for handle in &live {
            let slot = engine.slot(*handle).unwrap();
            let bounding_slot = engine.bounding_slot(*handle).unwrap();
            let group = engine
                .groups()
                .find(|(_, group)| group.member(slot).map(|member| member.handle) == Some(*handle));

            assert!(group.is_some(), "round {round}: slot {slot} does not hold its owner");
            assert_eq!(engine.bounding_registry().owner(bounding_slot), Some(*handle));
        }

        assert_eq!(engine.bounding_registry().len(), live.len());
        assert_eq!(engine.instance_count(), live.len());
    }
}

#[test]
fn unchanged_frames_do_not_rebuild() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    join_many(&mut engine, 20, at(0.0, 0.0, -10.0));

    engine.tick(&input(), &mut submitter);
    assert_eq!(engine.last_frame_stats().groups_rebuilt, 1);
    let first = submitter.sizes();

    engine.tick(&input(), &mut submitter);
    assert_eq!(engine.last_frame_stats().groups_rebuilt, 0);
    assert_eq!(submitter.sizes(), first);

    let group = engine.group_id(&key()).unwrap();
    assert_eq!(engine.group(group).map(|group| group.rebuild_count()), Some(1));
}

#[test]
fn joins_are_applied_at_the_next_tick() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();

    let handle = engine.join(OwnerHandle(1), key(), at(0.0, 0.0, -5.0)).unwrap();

    assert_eq!(engine.phase(), FramePhase::Registering);
    assert_eq!(engine.pending_registrations(), 1);
    assert_eq!(engine.slot(handle), None);
    assert!(engine.bounding_registry().is_empty());

    engine.tick(&input(), &mut submitter);

    assert_eq!(engine.phase(), FramePhase::Idle);
    assert_eq!(engine.pending_registrations(), 0);
    assert_eq!(engine.slot(handle), Some(0));
    assert_eq!(engine.is_visible(handle), Some(true));
}

#[test]
fn quit_before_attach_leaves_nothing_behind() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();

    let handle = engine.join(OwnerHandle(1), key(), at(0.0, 0.0, -5.0)).unwrap();
    engine.quit(handle).unwrap();
    engine.tick(&input(), &mut submitter);

    assert_eq!(engine.instance_count(), 0);
    assert!(engine.bounding_registry().is_empty());
    assert!(submitter.batches.is_empty());
}

#[test]
fn rejected_joins_allocate_nothing() {
    let mut engine = engine();

    let missing_geometry = engine.join(
        OwnerHandle(1),
        ResourceKey::new(GeometryId(7), SurfaceId(0)),
        Mat4::IDENTITY,
    );
    let missing_surface = engine.join(
        OwnerHandle(1),
        ResourceKey::new(GeometryId(0), SurfaceId(7)),
        Mat4::IDENTITY,
    );
    let not_instanced = engine.join(
        OwnerHandle(1),
        ResourceKey::new(GeometryId(0), SurfaceId(1)),
        Mat4::IDENTITY,
    );

    assert_eq!(missing_geometry, Err(JoinError::MissingGeometry(GeometryId(7))));
    assert_eq!(missing_surface, Err(JoinError::MissingSurface(SurfaceId(7))));
    assert_eq!(not_instanced, Err(JoinError::InstancingDisabled(SurfaceId(1))));
    assert_eq!(engine.instance_count(), 0);
    assert_eq!(engine.pending_registrations(), 0);
    assert_eq!(engine.phase(), FramePhase::Idle);
    assert_eq!(engine.groups().count(), 0);
}

#[test]
fn region_outside_culls_contained_instances() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    engine.set_culling_region(RegionId(1), at(0.0, 0.0, 20.0), Vec3::splat(2.0));
    let handles = join_many(&mut engine, 2, at(0.0, 0.0, -10.0));
    engine.assign_region(handles[0], Some(RegionId(1))).unwrap();

    engine.tick(&input(), &mut submitter);

    assert_eq!(engine.is_visible(handles[0]), Some(false));
    assert_eq!(engine.is_visible(handles[1]), Some(true));
    assert_eq!(engine.last_frame_stats().region_culled, 1);
    assert_eq!(submitter.instance_count(), 1);

    assert!(engine.remove_culling_region(RegionId(1)));
    engine.tick(&input(), &mut submitter);

    assert_eq!(engine.is_visible(handles[0]), Some(true));
    assert_eq!(submitter.instance_count(), 2);
}

#[test]
fn lod_bands_split_batches_by_distance() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    let group = engine.get_or_create_group(key());
    engine
        .configure_lod_bands(group, vec![LodBand::new(0.0, 10.0), LodBand::new(10.0, 30.0)])
        .unwrap();

    engine.join(OwnerHandle(0), key(), at(0.0, 0.0, -5.0)).unwrap();
    engine.join(OwnerHandle(1), key(), at(0.0, 0.0, -6.0)).unwrap();
    engine.join(OwnerHandle(2), key(), at(0.0, 0.0, -20.0)).unwrap();
    engine.join(OwnerHandle(3), key(), at(0.0, 0.0, -50.0)).unwrap();

    engine.tick(&input(), &mut submitter);

    let bands: Vec<(usize, usize)> = submitter
        .batches
        .iter()
        .map(|batch| (batch.band, batch.instances.len()))
        .collect();
    assert_eq!(bands, vec![(0, 2), (1, 1)]);

    let moved = FrameInput::new(
        Vec3::new(0.0, 0.0, -15.0),
        Vec3::Y,
        Frustum::from_view_projection(view_projection()),
        0.0,
    );
    engine.tick(&moved, &mut submitter);

    assert_eq!(engine.last_frame_stats().groups_rebuilt, 1);
}

#[test]
fn overlapping_lod_bands_are_rejected() {
    let mut engine = engine();
    let group = engine.get_or_create_group(key());

    let result =
        engine.configure_lod_bands(group, vec![LodBand::new(0.0, 10.0), LodBand::new(9.0, 30.0)]);

    assert!(matches!(result, Err(EngineError::InvalidLodBands(_))));
}

#[test]
fn hidden_instances_stay_hidden_until_shown() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    let handles = join_many(&mut engine, 3, at(0.0, 0.0, -10.0));
    engine.set_visible(handles[1], false).unwrap();

    engine.tick(&input(), &mut submitter);
    assert_eq!(submitter.instance_count(), 2);
    assert_eq!(engine.is_visible(handles[1]), Some(false));

    engine.set_visible(handles[1], true).unwrap();
    engine.tick(&input(), &mut submitter);
    assert_eq!(submitter.instance_count(), 3);
}

#[test]
fn registrar_changes_arrive_from_other_threads() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    let handles = join_many(&mut engine, 2, at(0.0, 0.0, -10.0));
    engine.tick(&input(), &mut submitter);

    let registrar = engine.registrar();
    let first = handles[0];
    let second = handles[1];
    std::thread::spawn(move || {
        assert!(registrar.set_visible(first, false));
        assert!(registrar.update_transform(second, at(0.0, 0.0, 50.0)));
    })
    .join()
    .unwrap();

    assert_eq!(engine.pending_registrations(), 2);
    engine.tick(&input(), &mut submitter);

    assert_eq!(engine.is_visible(first), Some(false));
    assert_eq!(engine.is_visible(second), Some(false));
    assert!(submitter.batches.is_empty());
}

#[test]
fn disabled_culling_draws_everything() {
    let mut engine = engine_with(EngineConfig {
        enable_culling: false,
        ..EngineConfig::default()
    });
    let mut submitter = RecordingSubmitter::default();
    join_many(&mut engine, 5, at(0.0, 0.0, 50.0));

    engine.tick(&input(), &mut submitter);

    assert_eq!(submitter.instance_count(), 5);
}

#[test]
fn thinning_only_applies_while_culling() {
    let mut engine = engine_with(EngineConfig {
        enable_culling: false,
        ..EngineConfig::default()
    });
    let mut submitter = RecordingSubmitter::default();
    join_many(&mut engine, 5, at(0.0, 0.0, -10.0));
    engine.set_visible_probability(0.0).unwrap();

    engine.tick(&input(), &mut submitter);
    assert_eq!(submitter.instance_count(), 5);

    engine.set_culling_enabled(true);
    engine.tick(&input(), &mut submitter);
    assert!(submitter.batches.is_empty());
    assert_eq!(engine.last_frame_stats().visible, 5);
}

#[test]
fn zero_probability_thins_out_every_instance() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    join_many(&mut engine, 5, at(0.0, 0.0, -10.0));

    engine.set_visible_probability(0.0).unwrap();
    engine.tick(&input(), &mut submitter);

    assert!(submitter.batches.is_empty());
    assert_eq!(engine.last_frame_stats().visible, 5);
}

struct Owners(HashMap<OwnerHandle, Mat4>);

impl TransformSource for Owners {
    fn world_matrix(&self, owner: OwnerHandle) -> Option<Mat4> {
        self.0.get(&owner).copied()
    }
}

#[test]
fn synced_instances_follow_their_owner() {
    let mut engine = engine_with(EngineConfig {
        sync_transforms: true,
        ..EngineConfig::default()
    });
    let mut submitter = RecordingSubmitter::default();
    let follower = engine.join(OwnerHandle(1), key(), at(0.0, 0.0, 50.0)).unwrap();
    let once = engine.join(OwnerHandle(2), key(), at(0.0, 0.0, 50.0)).unwrap();
    let ignored = engine.join(OwnerHandle(3), key(), at(0.0, 0.0, 50.0)).unwrap();
    engine.tick(&input(), &mut submitter);

    engine.set_sync_transform(follower, true).unwrap();
    engine.request_transform_sync(once, 1).unwrap();

    let owners = Owners(
        [
            (OwnerHandle(1), at(0.0, 0.0, -10.0)),
            (OwnerHandle(2), at(1.0, 0.0, -10.0)),
            (OwnerHandle(3), at(2.0, 0.0, -10.0)),
        ]
        .into_iter()
        .collect(),
    );
    engine.tick(&input().with_transform_source(&owners), &mut submitter);

    assert_eq!(engine.is_visible(follower), Some(true));
    assert_eq!(engine.is_visible(once), Some(true));
    assert_eq!(engine.is_visible(ignored), Some(false));

    // The one-shot request is used up
    let owners = Owners(
        [
            (OwnerHandle(1), at(0.0, 0.0, -12.0)),
            (OwnerHandle(2), at(1.0, 0.0, 50.0)),
        ]
        .into_iter()
        .collect(),
    );
    engine.tick(&input().with_transform_source(&owners), &mut submitter);

    assert_eq!(engine.is_visible(once), Some(true));
    assert_eq!(submitter.instance_count(), 2);
}

#[test]
fn sync_request_waits_for_a_delivered_matrix() {
    let mut engine = engine_with(EngineConfig {
        sync_transforms: true,
        ..EngineConfig::default()
    });
    let mut submitter = RecordingSubmitter::default();
    let handle = engine.join(OwnerHandle(7), key(), at(0.0, 0.0, 50.0)).unwrap();
    engine.tick(&input(), &mut submitter);
    engine.request_transform_sync(handle, 1).unwrap();

    let absent = Owners(HashMap::new());
    engine.tick(&input().with_transform_source(&absent), &mut submitter);
    assert_eq!(engine.is_visible(handle), Some(false));

    let owners = Owners([(OwnerHandle(7), at(0.0, 0.0, -10.0))].into_iter().collect());
    engine.tick(&input().with_transform_source(&owners), &mut submitter);
    assert_eq!(engine.is_visible(handle), Some(true));
    assert_eq!(submitter.instance_count(), 1);
}

#[test]
fn low_end_devices_only_accept_enabled_instances() {
    let mut engine = engine_with(EngineConfig {
        maximum_shader_lod: 100,
        ..EngineConfig::default()
    });
    let mut submitter = RecordingSubmitter::default();

    assert_eq!(
        engine.join(OwnerHandle(0), key(), at(0.0, 0.0, -10.0)),
        Err(JoinError::LowEndDisabled(100))
    );
    assert_eq!(engine.pending_registrations(), 0);

    engine
        .join_with(
            OwnerHandle(1),
            key(),
            at(0.0, 0.0, -10.0),
            InstanceKind::Static,
            true,
        )
        .unwrap();
    engine.tick(&input(), &mut submitter);

    assert_eq!(engine.instance_count(), 1);
    assert_eq!(submitter.instance_count(), 1);
}

#[test]
fn every_dirty_group_is_rebuilt_in_one_frame() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    let other = ResourceKey::new(GeometryId(1), SurfaceId(0));
    join_many(&mut engine, 3, at(0.0, 0.0, -10.0));
    engine.join(OwnerHandle(9), other, at(0.0, 0.0, -10.0)).unwrap();

    engine.tick(&input(), &mut submitter);
    assert_eq!(engine.last_frame_stats().groups_rebuilt, 2);
    assert_eq!(submitter.instance_count(), 4);

    engine.tick(&input(), &mut submitter);
    assert_eq!(engine.last_frame_stats().groups_rebuilt, 0);
}

fn sheet() -> BakedAnimationSheet {
    BakedAnimationSheet::new(
        4,
        2,
        vec![BakedClip {
            clip: ClipId(5),
            matrix_start_index: 4,
            matrix_count: 6,
        }],
        vec![[Vec4::X, Vec4::Y, Vec4::Z]; 10],
    )
}

#[test]
fn animated_instances_advance_through_their_clip() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    engine.set_animation_sheet(Some(sheet()));
    let crowd = ResourceKey::new(GeometryId(1), SurfaceId(0));
    engine
        .join_animated(OwnerHandle(0), crowd, at(0.0, 0.0, -10.0), ClipId(5), 3.0)
        .unwrap();
    engine.join(OwnerHandle(1), key(), at(0.0, 0.0, -10.0)).unwrap();

    let step = FrameInput {
        delta_time: 0.5,
        ..input()
    };

    engine.tick(&step, &mut submitter);
    let rows: Vec<(ResourceKey, f32, f32)> = submitter
        .batches
        .iter()
        .map(|batch| (batch.key, batch.instances[0].animation_row, batch.instances[0].uv_index))
        .collect();
    // The first frame samples time zero
    assert!(rows.contains(&(crowd, 4.0, 3.0)));
    assert!(rows.contains(&(key(), 0.0, 0.0)));

    engine.tick(&step, &mut submitter);
    let crowd_batch = submitter
        .batches
        .iter()
        .find(|batch| batch.key == crowd)
        .unwrap();
    assert_eq!(crowd_batch.instances[0].animation_row, 8.0);
}

#[test]
fn detail_cull_rejects_animated_instances_at_the_screen_edge() {
    let mut engine = engine();
    let mut submitter = RecordingSubmitter::default();
    engine.set_animation_sheet(Some(sheet()));
    let crowd = ResourceKey::new(GeometryId(0), SurfaceId(0));
    let centered = engine
        .join_animated(OwnerHandle(0), crowd, at(0.0, 0.0, -10.0), ClipId(5), 0.0)
        .unwrap();
    let at_edge = engine
        .join_animated(OwnerHandle(1), crowd, at(9.7, 0.0, -10.0), ClipId(5), 0.0)
        .unwrap();

    let input = FrameInput::from_camera(Vec3::ZERO, Vec3::Y, view_projection(), 0.0);
    engine.tick(&input, &mut submitter);

    assert_eq!(engine.is_visible(centered), Some(true));
    assert_eq!(engine.is_visible(at_edge), Some(false));
    assert_eq!(engine.last_frame_stats().detail_culled, 1);
}
