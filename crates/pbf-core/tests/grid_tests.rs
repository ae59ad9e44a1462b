use glam::Vec3;
use pbf_core::grid::{morton, NeighborLists, NeighborSearch, SortedGrid, SpatialHashMap};

/// Hash float to [0,1).
fn hash11(p: f32) -> f32 {
    let mut p = (p * 0.1031).fract();
    p *= p + 33.33;
    p *= p + p;
    p.fract().abs()
}

/// Deterministic point in the cube `[-extent, extent]^3` for seed `i`.
fn hash_point(i: u32, extent: f32) -> Vec3 {
    let s = i as f32;
    Vec3::new(
        hash11(s * 1.37 + 0.11),
        hash11(s * 2.71 + 0.53),
        hash11(s * 3.97 + 0.89),
    ) * (2.0 * extent)
        - Vec3::splat(extent)
}

fn cloud(n: u32, extent: f32) -> Vec<Vec3> {
    (0..n).map(|i| hash_point(i, extent)).collect()
}

fn brute_force(points: &[Vec3], q: Vec3, r: f32) -> Vec<u32> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| (**p - q).length_squared() <= r * r)
        .map(|(i, _)| i as u32)
        .collect()
}

fn sorted(mut v: Vec<u32>) -> Vec<u32> {
    v.sort_unstable();
    v
}

#[test]
fn test_hash_map_matches_brute_force() {
    let points = cloud(600, 2.0);
    let radius = 0.45;
    for cell_size in [0.1, 0.25, 0.45] {
        let mut map = SpatialHashMap::new(cell_size);
        map.build(&points);
        for (i, &q) in points.iter().enumerate().step_by(7) {
            let mut found = Vec::new();
            map.query_radius(q, radius, &mut found);
            assert_eq!(
                sorted(found),
                brute_force(&points, q, radius),
                "cell size {} query {}",
                cell_size,
                i
            );
        }
    }
}

#[test]
fn test_sorted_grid_matches_brute_force() {
    let points = cloud(800, 3.0);
    let radius = 0.5;
    for cell_size in [0.125, 0.3, 0.5] {
        let mut grid = SortedGrid::new(cell_size);
        grid.build(&points);
        assert_eq!(grid.len(), points.len());
        for (i, &q) in points.iter().enumerate().step_by(5) {
            assert_eq!(
                sorted(grid.neighbors(q, radius)),
                brute_force(&points, q, radius),
                "cell size {} query {}",
                cell_size,
                i
            );
        }
        // Query points that are not particles, including outside the cloud.
        for q in [Vec3::ZERO, Vec3::splat(2.9), Vec3::splat(-3.2), Vec3::new(10.0, 0.0, 0.0)] {
            assert_eq!(sorted(grid.neighbors(q, radius)), brute_force(&points, q, radius));
        }
    }
}

#[test]
fn test_rebuild_is_deterministic() {
    let points = cloud(500, 1.5);
    let mut a = SortedGrid::new(0.2);
    let mut b = SortedGrid::new(0.2);
    a.build(&points);
    b.build(&points);
    a.build(&points);
    assert_eq!(a.permutation(), b.permutation());
    assert_eq!(a.cells(), b.cells());
    for &q in points.iter().step_by(11) {
        assert_eq!(a.neighbors(q, 0.3), b.neighbors(q, 0.3));
    }

    let mut map = SpatialHashMap::new(0.2);
    map.build(&points);
    let first: Vec<Vec<u32>> = points.iter().map(|&q| sorted(map.neighbors(q, 0.3))).collect();
    map.build(&points);
    let second: Vec<Vec<u32>> = points.iter().map(|&q| sorted(map.neighbors(q, 0.3))).collect();
    assert_eq!(first, second);
}

#[test]
fn test_every_particle_in_exactly_one_cell() {
    let points = cloud(300, 1.0);
    let mut grid = SortedGrid::new(0.15);
    grid.build(&points);
    let mut seen = vec![0u32; points.len()];
    for c in grid.cells() {
        for slot in c.start..c.end {
            seen[grid.permutation()[slot as usize] as usize] += 1;
        }
    }
    assert!(seen.iter().all(|&n| n == 1));

    // The cell a particle is stored in is the cell of its position.
    for (slot, &i) in grid.permutation().iter().enumerate() {
        let range = grid.cell_range(grid.cell_of(points[i as usize])).unwrap();
        assert!(range.contains(&slot));
    }
}

#[test]
fn test_purge_interval() {
    let interval = 5;
    let mut map = SpatialHashMap::with_purge_interval(0.5, interval);
    for (i, p) in cloud(200, 2.0).into_iter().enumerate() {
        map.insert(i as u32, p);
    }
    let capacity = map.allocated_capacity();
    assert!(capacity > 0);

    for _ in 0..interval - 1 {
        map.clear();
        assert_eq!(map.allocated_capacity(), capacity, "clear must keep storage");
        assert_eq!(map.occupied_cells(), 0);
    }
    map.clear();
    assert_eq!(map.allocated_capacity(), 0, "purge must release storage");
}

#[test]
fn test_box_query_is_unfiltered_union() {
    let mut map = SpatialHashMap::new(1.0);
    map.build(&[
        Vec3::new(0.1, 0.1, 0.1),
        Vec3::new(0.9, 0.9, 0.9),
        Vec3::new(1.5, 0.5, 0.5),
        Vec3::new(5.0, 5.0, 5.0),
    ]);
    let mut out = Vec::new();
    // The box only touches cell (0,0,0) but returns all of its members.
    map.query_box(Vec3::splat(0.0), Vec3::splat(0.2), &mut out);
    assert_eq!(sorted(out.clone()), vec![0, 1]);

    out.clear();
    map.query_box(Vec3::ZERO, Vec3::new(1.2, 0.5, 0.5), &mut out);
    assert_eq!(sorted(out), vec![0, 1, 2]);
}

#[test]
fn test_neighbor_lists_match_grid() {
    let points = cloud(200, 1.0);
    let mut grid = SortedGrid::new(0.25);
    grid.build(&points);
    let mut lists = NeighborLists::new();
    lists.gather(&grid, &points, 0.25);
    assert_eq!(lists.len(), points.len());
    for (i, &q) in points.iter().enumerate() {
        assert_eq!(sorted(lists.neighbors(i).to_vec()), brute_force(&points, q, 0.25));
    }
    assert!(lists.neighbors(points.len()).is_empty());
}

#[test]
fn test_empty_and_degenerate_inputs() {
    let mut grid = SortedGrid::new(0.0);
    assert!(grid.cell_size() > 0.0);
    grid.build(&[]);
    assert!(grid.is_empty());
    assert!(grid.neighbors(Vec3::ZERO, 1.0).is_empty());

    let mut map = SpatialHashMap::new(-1.0);
    assert!(map.cell_size() > 0.0);
    map.build(&[]);
    assert!(map.neighbors(Vec3::ZERO, 1.0).is_empty());
}

#[test]
fn test_morton_orders_cells_by_key() {
    let mut grid = SortedGrid::new(1.0);
    grid.build(&[Vec3::new(1.5, 0.0, 0.0), Vec3::ZERO, Vec3::new(0.0, 1.5, 0.0)]);
    let keys: Vec<u64> = grid.cells().iter().map(|c| c.key).collect();
    assert_eq!(keys, vec![morton::encode(0, 0, 0), morton::encode(1, 0, 0), morton::encode(0, 1, 0)]);
    assert_eq!(grid.permutation(), &[1, 0, 2]);
}
