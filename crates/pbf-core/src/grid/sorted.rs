use std::ops::Range;

use glam::{IVec3, UVec3, Vec3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::morton::{self, MAX_COORD};
use super::{clamp_cell_size, NeighborSearch};

/// Above this many cells in a query cube, walk the occupied cells instead.
const RANGE_SCAN_LIMIT: u64 = 4096;

/// One occupied cell: its Morton key and the slots it owns in sorted order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRange {
    pub key: u64,
    pub start: u32,
    pub end: u32,
}

/// Particles sorted by the Morton key of their cell.
///
/// Build is a stable sort of indices by key, so equal inputs always produce
/// the same permutation. Cells are addressed relative to the component-wise
/// minimum of the input, clamped to 21 bits per axis; points beyond that
/// range share the edge cell and are separated by the exact distance test.
pub struct SortedGrid {
    cell_size: f32,
    inv_cell_size: f32,
    origin: Vec3,
    /// Morton key per original index (scratch for the sort).
    keys: Vec<u64>,
    /// Sorted slot -> original index.
    order: Vec<u32>,
    /// Positions in sorted order, for coalesced distance checks.
    sorted_positions: Vec<Vec3>,
    /// Occupied cells ordered by key.
    cells: Vec<CellRange>,
}

impl SortedGrid {
    pub fn new(cell_size: f32) -> Self {
        let cell_size = clamp_cell_size(cell_size);
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            origin: Vec3::ZERO,
            keys: Vec::new(),
            order: Vec::new(),
            sorted_positions: Vec::new(),
            cells: Vec::new(),
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Change the cell size. Takes effect on the next build.
    pub fn set_cell_size(&mut self, cell_size: f32) {
        let cell_size = clamp_cell_size(cell_size);
        self.cell_size = cell_size;
        self.inv_cell_size = 1.0 / cell_size;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sorted slot -> original index.
    #[inline]
    pub fn permutation(&self) -> &[u32] {
        &self.order
    }

    #[inline]
    pub fn cells(&self) -> &[CellRange] {
        &self.cells
    }

    /// Positions in sorted order.
    #[inline]
    pub fn sorted_positions(&self) -> &[Vec3] {
        &self.sorted_positions
    }

    /// Rebuild from scratch. Storage is reused between builds.
    pub fn build(&mut self, positions: &[Vec3]) {
        let n = positions.len();
        self.keys.clear();
        self.order.clear();
        self.sorted_positions.clear();
        self.cells.clear();
        if n == 0 {
            self.origin = Vec3::ZERO;
            return;
        }

        self.origin = positions
            .iter()
            .copied()
            .filter(|p| p.is_finite())
            .reduce(Vec3::min)
            .unwrap_or(Vec3::ZERO);

        // 1. Key per particle
        let origin = self.origin;
        let inv = self.inv_cell_size;
        #[cfg(feature = "parallel")]
        positions
            .par_iter()
            .map(|&p| key_for(quantize(p, origin, inv)))
            .collect_into_vec(&mut self.keys);
        #[cfg(not(feature = "parallel"))]
        self.keys
            .extend(positions.iter().map(|&p| key_for(quantize(p, origin, inv))));

        // 2. Stable sort of indices by key
        self.order.extend(0..n as u32);
        let keys = &self.keys;
        #[cfg(feature = "parallel")]
        self.order.par_sort_by_key(|&i| keys[i as usize]);
        #[cfg(not(feature = "parallel"))]
        self.order.sort_by_key(|&i| keys[i as usize]);

        // 3. Gather positions and cut ranges at key changes
        self.sorted_positions
            .extend(self.order.iter().map(|&i| positions[i as usize]));
        let mut start = 0usize;
        for slot in 1..=n {
            let prev = self.keys[self.order[slot - 1] as usize];
            if slot == n || self.keys[self.order[slot] as usize] != prev {
                self.cells.push(CellRange {
                    key: prev,
                    start: start as u32,
                    end: slot as u32,
                });
                start = slot;
            }
        }
    }

    /// Quantized cell of a world position.
    #[inline]
    pub fn cell_of(&self, pos: Vec3) -> UVec3 {
        quantize(pos, self.origin, self.inv_cell_size)
    }

    /// Sorted-slot range of a cell, `None` when empty.
    pub fn cell_range(&self, cell: UVec3) -> Option<Range<usize>> {
        let key = key_for(cell);
        self.cells
            .binary_search_by_key(&key, |c| c.key)
            .ok()
            .map(|i| self.cells[i].start as usize..self.cells[i].end as usize)
    }

    /// Every indexed point within `radius` of `pos`.
    pub fn for_each_in_radius<F: FnMut(u32)>(&self, pos: Vec3, radius: f32, mut f: F) {
        let radius = radius.max(0.0);
        let r2 = radius * radius;
        self.visit_slots(pos, radius, |slot| {
            if (self.sorted_positions[slot] - pos).length_squared() <= r2 {
                f(self.order[slot]);
            }
        });
    }

    fn visit_slots<F: FnMut(usize)>(&self, pos: Vec3, radius: f32, mut f: F) {
        if self.cells.is_empty() || !pos.is_finite() {
            return;
        }
        let radius = radius.max(0.0);
        let lo = self.cell_of(pos - Vec3::splat(radius));
        let hi = self.cell_of(pos + Vec3::splat(radius));

        let span = (hi - lo + UVec3::ONE).as_u64vec3();
        let volume = span.x.saturating_mul(span.y).saturating_mul(span.z);
        if volume > RANGE_SCAN_LIMIT && volume > self.cells.len() as u64 {
            for cell in &self.cells {
                let (x, y, z) = morton::decode(cell.key);
                let c = UVec3::new(x, y, z);
                if c.cmpge(lo).all() && c.cmple(hi).all() {
                    for slot in cell.start as usize..cell.end as usize {
                        f(slot);
                    }
                }
            }
            return;
        }

        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    if let Some(range) = self.cell_range(UVec3::new(x, y, z)) {
                        for slot in range {
                            f(slot);
                        }
                    }
                }
            }
        }
    }
}

impl NeighborSearch for SortedGrid {
    fn for_each_neighbor<F: FnMut(u32)>(&self, pos: Vec3, radius: f32, f: F) {
        self.for_each_in_radius(pos, radius, f);
    }
}

#[inline]
fn quantize(pos: Vec3, origin: Vec3, inv_cell_size: f32) -> UVec3 {
    let c: IVec3 = ((pos - origin) * inv_cell_size).floor().as_ivec3();
    c.clamp(IVec3::ZERO, IVec3::splat(MAX_COORD as i32)).as_uvec3()
}

#[inline]
fn key_for(cell: UVec3) -> u64 {
    morton::encode(cell.x, cell.y, cell.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_cover_all_slots() {
        let positions: Vec<Vec3> = (0..50)
            .map(|i| Vec3::new(i as f32 * 0.37, (i % 7) as f32 * 0.2, (i % 3) as f32))
            .collect();
        let mut grid = SortedGrid::new(0.5);
        grid.build(&positions);

        let mut covered = 0;
        let mut last_key = None;
        for c in grid.cells() {
            assert!(c.start < c.end);
            assert_eq!(c.start as usize, covered);
            covered = c.end as usize;
            if let Some(k) = last_key {
                assert!(c.key > k, "cells must be ordered by key");
            }
            last_key = Some(c.key);
        }
        assert_eq!(covered, positions.len());
    }

    #[test]
    fn test_huge_radius_walks_occupied_cells() {
        let positions = vec![Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 1.0)];
        let mut grid = SortedGrid::new(1.0e-3);
        grid.build(&positions);
        let mut found = Vec::new();
        grid.for_each_in_radius(Vec3::ZERO, 1.0e3, |i| found.push(i));
        found.sort_unstable();
        assert_eq!(found, vec![0, 1, 2]);

        found.clear();
        grid.for_each_in_radius(Vec3::ZERO, 2.5, |i| found.push(i));
        found.sort_unstable();
        assert_eq!(found, vec![0, 2]);
    }

    #[test]
    fn test_permutation_is_stable_within_cell() {
        let positions = vec![Vec3::splat(0.1), Vec3::splat(0.2), Vec3::splat(0.3)];
        let mut grid = SortedGrid::new(1.0);
        grid.build(&positions);
        assert_eq!(grid.permutation(), &[0, 1, 2]);
        assert_eq!(grid.cells().len(), 1);
    }
}
