use glam::Vec3;
use pbf_core::boundary::BoundaryParticle;
use pbf_core::constraints::density::{apply_corrections, solve_density, DensityParams};
use pbf_core::fluids::viscosity::apply_xsph_viscosity;
use pbf_core::fluids::{poly6_kernel, spiky_gradient, Kernels};
use pbf_core::grid::{NeighborLists, SortedGrid};
use pbf_core::particle::ParticleSet;
use pbf_core::FluidConfig;

const H: f32 = 0.1;

fn particles(positions: &[Vec3]) -> ParticleSet {
    let mut set = ParticleSet::with_capacity(positions.len()).unwrap();
    for (i, &p) in positions.iter().enumerate() {
        set.push(p, Vec3::ZERO, i as u32, 0);
    }
    set
}

fn lists(points: &[Vec3], radius: f32) -> NeighborLists {
    let mut grid = SortedGrid::new(radius);
    grid.build(points);
    let mut lists = NeighborLists::new();
    lists.gather(&grid, points, radius);
    lists
}

fn params(config: &FluidConfig) -> DensityParams {
    DensityParams {
        rest_density: config.rest_density,
        particle_mass: config.particle_mass,
        relaxation: config.relaxation,
        tensile_correction: false,
    }
}

fn config() -> FluidConfig {
    let mut config = FluidConfig {
        smoothing_radius: H,
        ..Default::default()
    };
    config.recompute_derived();
    config
}

#[test]
fn test_poly6_support() {
    assert!(poly6_kernel(0.0, H) > 0.0);
    assert!(poly6_kernel(0.05, H) < poly6_kernel(0.0, H));
    assert_eq!(poly6_kernel(H, H), 0.0);
    assert_eq!(poly6_kernel(2.0 * H, H), 0.0);
}

#[test]
fn test_spiky_gradient_points_toward_neighbor() {
    // r = x_i - x_j along +X, so the gradient w.r.t. x_i is along -X.
    let r = Vec3::new(0.05, 0.0, 0.0);
    let g = spiky_gradient(r, r.length(), H);
    assert!(g.x < 0.0);
    assert_eq!(g.y, 0.0);
    assert_eq!(spiky_gradient(Vec3::ZERO, 0.0, H), Vec3::ZERO);
    assert_eq!(spiky_gradient(Vec3::X, 1.0, H), Vec3::ZERO);
}

#[test]
fn test_kernels_match_free_functions() {
    let k = Kernels::new(H);
    let r = Vec3::new(0.02, 0.03, -0.01);
    assert!((k.poly6_sq(r.length_squared()) - poly6_kernel(r.length(), H)).abs() < 1e-2);
    assert!((k.spiky_gradient(r, r.length()) - spiky_gradient(r, r.length(), H)).length() < 1e-3);
}

#[test]
fn test_two_particles_at_rest_spacing_barely_move() {
    let config = config();
    let s = config.particle_spacing;
    let points = [Vec3::ZERO, Vec3::new(s, 0.0, 0.0)];
    let mut set = particles(&points);
    let fluid = lists(&points, H);
    let boundary = NeighborLists::new();

    solve_density(&mut set, &fluid, &boundary, &[], &Kernels::new(H), &params(&config));

    for dp in &set.corrections {
        assert!(dp.length() < 1e-6 * s, "correction {:?}", dp);
    }
    assert!(set.density[0] > 0.0);
    assert!(set.density[0] <= config.rest_density);
}

/// 7x7x7 cubic lattice centred on the origin.
fn lattice(step: f32) -> Vec<Vec3> {
    let mut points = Vec::new();
    for x in -3..=3 {
        for y in -3..=3 {
            for z in -3..=3 {
                points.push(Vec3::new(x as f32, y as f32, z as f32) * step);
            }
        }
    }
    points
}

fn index_at(points: &[Vec3], p: Vec3) -> usize {
    points.iter().position(|q| (*q - p).length() < 1e-6).unwrap()
}

#[test]
fn test_interior_lattice_at_rest_spacing_is_at_rest_density() {
    let config = config();
    let s = config.particle_spacing;
    let points = lattice(s);
    let mut set = particles(&points);
    let fluid = lists(&points, H);

    solve_density(&mut set, &fluid, &NeighborLists::new(), &[], &Kernels::new(H), &params(&config));

    let center = index_at(&points, Vec3::ZERO);
    let rho = set.density[center];
    assert!(
        (rho - config.rest_density).abs() < 0.02 * config.rest_density,
        "interior density {}",
        rho
    );
    assert!(set.lambda[center].abs() < 1e-4, "lambda {}", set.lambda[center]);
    assert!(set.corrections[center].length() < 1e-6 * s);
}

#[test]
fn test_slightly_compressed_lattice_gets_small_outward_correction() {
    let config = config();
    let s = config.particle_spacing * 0.95;
    let points = lattice(s);
    let mut set = particles(&points);
    let fluid = lists(&points, H);

    let error = solve_density(&mut set, &fluid, &NeighborLists::new(), &[], &Kernels::new(H), &params(&config));
    assert!(error > 0.0);

    let center = index_at(&points, Vec3::ZERO);
    assert!(set.density[center] > config.rest_density * 1.1);
    assert!(set.corrections[center].length() < 1e-6 * s);

    // One step toward the +X face: pushed outward, by far less than a spacing.
    let next = index_at(&points, Vec3::new(s, 0.0, 0.0));
    let dp = set.corrections[next];
    assert!(dp.x > 0.0, "correction {:?}", dp);
    assert!(dp.length() < 0.01 * s, "correction {:?}", dp);
    for dp in &set.corrections {
        assert!(dp.length() < 0.5 * s);
    }
}

#[test]
fn test_zero_neighbors_gives_zero_correction() {
    let config = config();
    let points = [Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)];
    let mut set = particles(&points);
    let fluid = lists(&points, H);
    let error = solve_density(
        &mut set,
        &fluid,
        &NeighborLists::new(),
        &[],
        &Kernels::new(H),
        &params(&config),
    );
    assert_eq!(error, 0.0);
    assert!(set.corrections.iter().all(|c| *c == Vec3::ZERO));
    assert!(set.lambda.iter().all(|l| l.is_finite()));
}

#[test]
fn test_compressed_block_expands() {
    let config = config();
    // 4x4x4 block at a quarter of rest spacing is far above rest density.
    let step = config.particle_spacing * 0.25;
    let mut points = Vec::new();
    for x in 0..4 {
        for y in 0..4 {
            for z in 0..4 {
                points.push(Vec3::new(x as f32, y as f32, z as f32) * step);
            }
        }
    }
    let mut set = particles(&points);
    let fluid = lists(&points, H);
    let kernels = Kernels::new(H);
    let error = solve_density(&mut set, &fluid, &NeighborLists::new(), &[], &kernels, &params(&config));
    assert!(error > 0.0);

    let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
    let corner = 0;
    let outward = points[corner] - center;
    assert!(set.corrections[corner].dot(outward) > 0.0, "corner should move outward");
    assert!(set.lambda.iter().all(|&l| l <= 0.0));

    let before: f32 = points.iter().map(|p| (*p - center).length()).sum();
    apply_corrections(&mut set);
    let after: f32 = set.predicted.iter().map(|p| (*p - center).length()).sum();
    assert!(after > before);
}

#[test]
fn test_boundary_particles_push_fluid_away() {
    let config = config();
    let p = Vec3::new(0.0, 0.02, 0.0);
    let mut set = particles(&[p]);
    let fluid = lists(&[p], H);

    // A dense patch of boundary samples just below the particle.
    let mut boundary = Vec::new();
    let d = config.particle_spacing * 0.25;
    for x in -4..=4 {
        for z in -4..=4 {
            let pos = Vec3::new(x as f32 * d, 0.0, z as f32 * d);
            boundary.push(BoundaryParticle {
                local_position: pos,
                local_normal: Vec3::Y,
                position: pos,
                normal: Vec3::Y,
                psi: config.particle_mass,
                owner_id: 0,
                collider: 0,
            });
        }
    }
    let positions: Vec<Vec3> = boundary.iter().map(|b| b.position).collect();
    let mut grid = SortedGrid::new(H);
    grid.build(&positions);
    let mut bn = NeighborLists::new();
    bn.gather(&grid, &[p], H);
    assert!(!bn.neighbors(0).is_empty());

    solve_density(&mut set, &fluid, &bn, &boundary, &Kernels::new(H), &params(&config));
    assert!(set.density[0] > config.rest_density);
    assert!(set.corrections[0].y > 0.0);
}

#[test]
fn test_xsph_pulls_velocities_together() {
    let config = config();
    let points = [Vec3::ZERO, Vec3::new(0.03, 0.0, 0.0)];
    let mut set = particles(&points);
    set.velocity[0] = Vec3::X;
    set.velocity[1] = -Vec3::X;
    set.density.iter_mut().for_each(|d| *d = config.rest_density);
    let fluid = lists(&points, H);

    apply_xsph_viscosity(&mut set, &fluid, &Kernels::new(H), config.particle_mass, 0.1);

    assert!(set.velocity[0].x < 1.0);
    assert!(set.velocity[1].x > -1.0);
    // Momentum is preserved for equal masses and densities.
    assert!((set.velocity[0] + set.velocity[1]).length() < 1e-5);
}
