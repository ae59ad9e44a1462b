use glam::{Affine3A, Quat, Vec3};
use pbf_core::particle::ParticleFlags;
use pbf_core::{
    CollisionPrimitive, DistanceField, EvictionPolicy, FluidConfig, FluidSolver, Readiness,
    SkeletalPose,
};

const DT: f32 = 1.0 / 60.0;

fn config() -> FluidConfig {
    let mut config = FluidConfig {
        max_particles: 64,
        ..Default::default()
    };
    config.recompute_derived();
    config
}

fn weightless() -> FluidConfig {
    FluidConfig {
        gravity: Vec3::ZERO,
        ..config()
    }
}

fn floor() -> CollisionPrimitive {
    CollisionPrimitive::cuboid(Vec3::new(0.0, -1.0, 0.0), Vec3::splat(1.0), Quat::IDENTITY)
}

#[test]
fn test_failed_allocation_is_not_ready() {
    let config = FluidConfig {
        max_particles: usize::MAX,
        ..Default::default()
    };
    assert!(FluidSolver::try_new(config.clone()).is_err());

    let mut solver = FluidSolver::new(config);
    assert_eq!(solver.readiness(), Readiness::NotReady);
    assert_eq!(solver.spawn(Vec3::ZERO, Vec3::ZERO, 0), None);
    solver.step(DT, &[floor()]);
    assert_eq!(solver.frame(), 0);
    assert!(solver.particles().is_empty());
}

#[test]
fn test_invalid_dt_is_a_no_op() {
    let mut solver = FluidSolver::new(config());
    solver.spawn(Vec3::new(0.0, 1.0, 0.0), Vec3::X, 0).unwrap();
    for dt in [0.0, -DT, f32::NAN, f32::INFINITY] {
        solver.step(dt, &[]);
    }
    assert_eq!(solver.frame(), 0);
    assert_eq!(solver.particles().positions()[0], Vec3::new(0.0, 1.0, 0.0));
    assert_eq!(solver.particles().velocities()[0], Vec3::X);
}

#[test]
fn test_rest_spacing_pair_stays_put() {
    let mut solver = FluidSolver::new(weightless());
    let s = solver.config().particle_spacing;
    let a = Vec3::new(0.3, 0.2, 0.1);
    let b = a + Vec3::new(s, 0.0, 0.0);
    solver.spawn(a, Vec3::ZERO, 0);
    solver.spawn(b, Vec3::ZERO, 0);
    for _ in 0..10 {
        solver.step(DT, &[]);
    }
    let view = solver.particles();
    assert!((view.positions()[0] - a).length() < 1e-6 * s);
    assert!((view.positions()[1] - b).length() < 1e-6 * s);
    assert_eq!(view.neighbor_counts(), &[1, 1]);
    assert!(view.densities()[0] > 0.0);
}

#[test]
fn test_free_fall_follows_gravity() {
    let mut solver = FluidSolver::new(config());
    solver.spawn(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, 0);
    solver.step(DT, &[]);
    let v = solver.particles().velocities()[0];
    assert!((v.y + 9.81 * DT).abs() < 1e-4);
    assert!((solver.particles().positions()[0].y - (10.0 - 9.81 * DT * DT)).abs() < 1e-4);
    assert_eq!(solver.stats().particle_count, 1);
    assert_eq!(solver.stats().boundary_count, 0);
}

#[test]
fn test_velocity_is_clamped() {
    let mut solver = FluidSolver::new(FluidConfig {
        max_velocity: 2.0,
        ..weightless()
    });
    solver.spawn(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0), 0);
    solver.step(DT, &[]);
    let v = solver.particles().velocities()[0];
    assert!(v.length() <= 2.0 + 1e-4);
}

#[test]
fn test_particle_never_sinks_into_floor() {
    let mut solver = FluidSolver::new(config());
    solver.spawn(Vec3::new(0.1, 0.2, -0.1), Vec3::ZERO, 0);
    let prims = [floor()];
    for _ in 0..120 {
        solver.step(DT, &prims);
        let p = solver.particles().positions()[0];
        assert!(p.is_finite());
        assert!(p.y >= -1e-4, "particle sank to {}", p.y);
        assert!(solver.particles().velocities()[0].is_finite());
    }
    assert!(solver.stats().boundary_count > 0);
    assert!(solver.particles().flags()[0].contains(ParticleFlags::BOUNDARY_ADJACENT));
}

#[test]
fn test_boundary_regenerates_only_on_change() {
    let mut solver = FluidSolver::new(config());
    let mut prims = vec![CollisionPrimitive::sphere(Vec3::ZERO, 0.3)];
    solver.step(DT, &prims);
    assert!(solver.stats().boundary_changed);
    solver.step(DT, &prims);
    assert!(!solver.stats().boundary_changed);

    prims[0].pose.translation.x += 1.0;
    solver.step(DT, &prims);
    assert!(!solver.stats().boundary_changed);

    solver.invalidate_boundary_cache();
    solver.step(DT, &prims);
    assert!(solver.stats().boundary_changed);
}

#[test]
fn test_reject_policy_refuses_when_full() {
    let mut solver = FluidSolver::new(FluidConfig {
        max_particles: 2,
        eviction: EvictionPolicy::Reject,
        ..config()
    });
    assert_eq!(solver.spawn(Vec3::ZERO, Vec3::ZERO, 1), Some(0));
    assert_eq!(solver.spawn(Vec3::X, Vec3::ZERO, 1), Some(1));
    assert_eq!(solver.spawn(Vec3::Y, Vec3::ZERO, 1), None);
    assert_eq!(solver.particles().len(), 2);
}

#[test]
fn test_evict_oldest_recycles() {
    let mut solver = FluidSolver::new(FluidConfig {
        max_particles: 2,
        eviction: EvictionPolicy::EvictOldest,
        ..config()
    });
    solver.spawn(Vec3::ZERO, Vec3::ZERO, 1);
    solver.spawn(Vec3::X, Vec3::ZERO, 1);
    assert_eq!(solver.spawn(Vec3::Y, Vec3::ZERO, 2), Some(2));
    let mut ids = solver.particles().particle_ids().to_vec();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
    assert!(!solver.particles().positions().contains(&Vec3::ZERO));
}

#[test]
fn test_spawn_rejects_non_finite_position() {
    let mut solver = FluidSolver::new(config());
    assert_eq!(solver.spawn(Vec3::splat(f32::NAN), Vec3::ZERO, 0), None);
    let id = solver.spawn(Vec3::ZERO, Vec3::splat(f32::INFINITY), 0).unwrap();
    assert_eq!(id, 0);
    assert_eq!(solver.particles().velocities()[0], Vec3::ZERO);
}

#[test]
fn test_despawn_by_index_and_id() {
    let mut solver = FluidSolver::new(config());
    for i in 0..4 {
        solver.spawn(Vec3::new(i as f32, 0.0, 0.0), Vec3::ZERO, 9);
    }
    assert!(solver.despawn(0));
    assert!(!solver.despawn(10));
    assert!(solver.despawn_id(2));
    assert!(!solver.despawn_id(2));
    let mut ids = solver.particles().particle_ids().to_vec();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 3]);

    solver.clear();
    assert!(solver.particles().is_empty());
    // Ids keep counting after a clear.
    assert_eq!(solver.spawn(Vec3::ZERO, Vec3::ZERO, 0), Some(4));
}

#[test]
fn test_render_buffer_mirrors_particles() {
    let mut solver = FluidSolver::new(weightless());
    solver.spawn(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, 5);
    solver.spawn(Vec3::new(-1.0, 0.0, 0.0), Vec3::ZERO, 6);
    solver.step(DT, &[]);
    let mut out = Vec::new();
    solver.write_render_buffer(&mut out);
    assert_eq!(out.len(), 2);
    let view = solver.particles();
    for (r, i) in out.iter().zip(0..) {
        assert_eq!(r.position, view.positions()[i].to_array());
        assert_eq!(r.source_id, view.source_ids()[i]);
        assert_eq!(r.density, view.densities()[i]);
    }
    let bytes: &[u8] = bytemuck::cast_slice(&out);
    assert_eq!(bytes.len(), 96);
}

#[test]
fn test_collision_feedback_reaches_reader() {
    let mut solver = FluidSolver::new(FluidConfig {
        feedback_enabled: true,
        ..weightless()
    });
    let reader = solver.feedback_reader();
    solver.spawn(Vec3::new(0.0, 0.5, 0.0), Vec3::ZERO, 0);
    let prims = [
        CollisionPrimitive::cuboid(Vec3::new(5.0, 0.0, 0.0), Vec3::splat(0.5), Quat::IDENTITY),
        CollisionPrimitive::sphere(Vec3::ZERO, 1.0),
    ];

    solver.step(DT, &prims);
    assert_eq!(solver.stats().primitive_contacts, 1);
    assert!(!reader.is_available());
    solver.step(DT, &prims);
    solver.step(DT, &prims);

    assert_eq!(reader.frame(), Some(1));
    assert_eq!(reader.contact_count(1), Some(1));
    assert_eq!(reader.contact_count(0), Some(0));
    let hits = reader.for_collider(1);
    assert_eq!(hits.count, 1);
    assert!(hits.entries[0].force.y > 0.0);
    assert!((hits.entries[0].position - Vec3::Y).length() < 1e-4);
}

#[test]
fn test_disabling_feedback_clears_reader() {
    let mut solver = FluidSolver::new(FluidConfig {
        feedback_enabled: true,
        ..weightless()
    });
    let reader = solver.feedback_reader();
    solver.spawn(Vec3::new(0.0, 0.5, 0.0), Vec3::ZERO, 0);
    let prims = [CollisionPrimitive::sphere(Vec3::ZERO, 1.0)];
    for _ in 0..4 {
        solver.step(DT, &prims);
    }
    assert!(reader.is_available());

    let mut config = solver.config().clone();
    config.feedback_enabled = false;
    solver.set_config(config);
    assert!(!reader.is_available());
    solver.step(DT, &prims);
    assert!(!reader.is_available());
}

#[test]
fn test_skinned_primitive_follows_bone() {
    let mut solver = FluidSolver::new(weightless());
    solver
        .transforms()
        .upload(3, SkeletalPose::new(vec![Affine3A::from_translation(Vec3::new(0.0, 5.0, 0.0))]));
    solver.spawn(Vec3::new(0.0, 5.2, 0.0), Vec3::ZERO, 0);
    let prims = [CollisionPrimitive::sphere(Vec3::ZERO, 1.0).with_owner(3).with_bone(0)];
    solver.step(DT, &prims);
    let p = solver.particles().positions()[0];
    assert!((p - Vec3::new(0.0, 6.0, 0.0)).length() < 1e-3, "got {:?}", p);
}

#[test]
fn test_distance_field_only_when_enabled() {
    let field =
        DistanceField::bake(Vec3::splat(-1.0), Vec3::splat(1.0), 0.125, |p| p.y).unwrap();
    let start = Vec3::new(0.0, -0.5, 0.0);

    let mut off = FluidSolver::new(weightless());
    off.set_distance_field(Some(field.clone()));
    off.spawn(start, Vec3::ZERO, 0);
    off.step(DT, &[]);
    assert_eq!(off.stats().field_contacts, 0);
    assert_eq!(off.particles().positions()[0], start);

    let mut on = FluidSolver::new(FluidConfig {
        distance_field_enabled: true,
        ..weightless()
    });
    on.set_distance_field(Some(field));
    on.spawn(start, Vec3::ZERO, 0);
    on.step(DT, &[]);
    assert_eq!(on.stats().field_contacts, 1);
    assert!(on.particles().positions()[0].y.abs() < 1e-4);
    assert!(on.particles().flags()[0].contains(ParticleFlags::COLLIDED));
}

#[test]
fn test_set_config_keeps_capacity() {
    let mut solver = FluidSolver::new(config());
    let mut next = solver.config().clone();
    next.max_particles = 4096;
    next.smoothing_radius = 0.2;
    solver.set_config(next);
    assert_eq!(solver.config().max_particles, 64);
    assert_eq!(solver.config().smoothing_radius, 0.2);
    assert!((solver.config().particle_spacing - 0.1).abs() < 1e-6);
}

#[test]
fn test_threaded_solver_steps() {
    let mut solver = FluidSolver::try_threaded(FluidConfig {
        feedback_enabled: true,
        ..weightless()
    })
    .unwrap();
    solver.spawn(Vec3::new(0.0, 0.5, 0.0), Vec3::ZERO, 0);
    let prims = [CollisionPrimitive::sphere(Vec3::ZERO, 1.0)];
    let reader = solver.feedback_reader();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !reader.is_available() && std::time::Instant::now() < deadline {
        solver.step(DT, &prims);
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert!(reader.is_available());
    // Later frames without contacts may already have replaced frame 1.
    assert!(reader.frame() >= Some(1));
    assert!(reader.contact_count(0).is_some());
}
