use std::collections::HashMap;

use glam::{IVec3, Vec3};

use super::{cell_coords, clamp_cell_size, NeighborSearch};

/// Number of clears between full storage releases.
pub const DEFAULT_PURGE_INTERVAL: u32 = 60;

/// Above this many cells in a query range, scan occupied cells instead of the range.
const RANGE_SCAN_LIMIT: i64 = 4096;

/// Cell coordinate -> particle index list.
///
/// Clearing keeps every allocated list (and the map itself) so that the next
/// frame's build does not reallocate; only every `purge_interval`-th clear
/// releases storage, which bounds the memory held by cells that have gone
/// permanently empty.
pub struct SpatialHashMap {
    cell_size: f32,
    inv_cell_size: f32,
    cells: HashMap<IVec3, Vec<u32>>,
    /// Positions from the last bulk build, indexed by particle index.
    positions: Vec<Vec3>,
    has_positions: bool,
    purge_interval: u32,
    clears_since_purge: u32,
}

impl SpatialHashMap {
    pub fn new(cell_size: f32) -> Self {
        Self::with_purge_interval(cell_size, DEFAULT_PURGE_INTERVAL)
    }

    pub fn with_purge_interval(cell_size: f32, purge_interval: u32) -> Self {
        let cell_size = clamp_cell_size(cell_size);
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::new(),
            positions: Vec::new(),
            has_positions: false,
            purge_interval: purge_interval.max(1),
            clears_since_purge: 0,
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn purge_interval(&self) -> u32 {
        self.purge_interval
    }

    /// Change the cell size. Existing contents are cleared.
    pub fn set_cell_size(&mut self, cell_size: f32) {
        let cell_size = clamp_cell_size(cell_size);
        if cell_size != self.cell_size {
            self.cell_size = cell_size;
            self.inv_cell_size = 1.0 / cell_size;
            self.clear();
        }
    }

    #[inline]
    pub fn cell_of(&self, pos: Vec3) -> IVec3 {
        cell_coords(pos, self.inv_cell_size)
    }

    /// Insert one index. Incremental inserts do not populate the position
    /// cache, so radius queries over them are broad-phase only.
    pub fn insert(&mut self, index: u32, pos: Vec3) {
        let cell = self.cell_of(pos);
        self.cells.entry(cell).or_default().push(index);
    }

    /// Clear, then insert `positions[i]` as index `i` and cache the positions
    /// for exact-distance filtering.
    pub fn build(&mut self, positions: &[Vec3]) {
        self.clear();
        for (i, &p) in positions.iter().enumerate() {
            let cell = cell_coords(p, self.inv_cell_size);
            self.cells.entry(cell).or_default().push(i as u32);
        }
        self.positions.extend_from_slice(positions);
        self.has_positions = true;
    }

    pub fn clear(&mut self) {
        self.clears_since_purge += 1;
        if self.clears_since_purge >= self.purge_interval {
            self.cells = HashMap::new();
            self.positions = Vec::new();
            self.clears_since_purge = 0;
        } else {
            for list in self.cells.values_mut() {
                list.clear();
            }
            self.positions.clear();
        }
        self.has_positions = false;
    }

    /// Indices within `radius` of `pos`, appended to `out`.
    ///
    /// Without a position cache every candidate in the overlapped cells is
    /// returned unfiltered.
    pub fn query_radius(&self, pos: Vec3, radius: f32, out: &mut Vec<u32>) {
        let radius = radius.max(0.0);
        let r2 = radius * radius;
        let lo = self.cell_of(pos - Vec3::splat(radius));
        let hi = self.cell_of(pos + Vec3::splat(radius));
        self.for_each_cell_in_range(lo, hi, |list| {
            for &j in list {
                match self.cached_position(j) {
                    Some(p) if (p - pos).length_squared() > r2 => {}
                    _ => out.push(j),
                }
            }
        });
    }

    /// Union of all cells whose coordinates lie in the box's cell range, unfiltered.
    pub fn query_box(&self, min: Vec3, max: Vec3, out: &mut Vec<u32>) {
        let lo = self.cell_of(min.min(max));
        let hi = self.cell_of(min.max(max));
        self.for_each_cell_in_range(lo, hi, |list| out.extend_from_slice(list));
    }

    /// Visit the lists of every stored cell in `lo..=hi`. Large ranges walk
    /// the occupied cells instead, so the cost never exceeds the map size.
    fn for_each_cell_in_range<F: FnMut(&[u32])>(&self, lo: IVec3, hi: IVec3, mut f: F) {
        let span = (hi.as_i64vec3() - lo.as_i64vec3() + glam::I64Vec3::ONE).max(glam::I64Vec3::ZERO);
        let volume = span.x.saturating_mul(span.y).saturating_mul(span.z);

        if volume > RANGE_SCAN_LIMIT && volume > self.cells.len() as i64 {
            for (cell, list) in &self.cells {
                if cell.cmpge(lo).all() && cell.cmple(hi).all() {
                    f(list);
                }
            }
            return;
        }

        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    if let Some(list) = self.cells.get(&IVec3::new(x, y, z)) {
                        f(list);
                    }
                }
            }
        }
    }

    /// Number of non-empty cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.values().filter(|l| !l.is_empty()).count()
    }

    /// Total element capacity currently held: map slots, every cell list and
    /// the position cache.
    pub fn allocated_capacity(&self) -> usize {
        self.cells.capacity()
            + self.cells.values().map(Vec::capacity).sum::<usize>()
            + self.positions.capacity()
    }

    #[inline]
    fn cached_position(&self, index: u32) -> Option<Vec3> {
        if self.has_positions {
            self.positions.get(index as usize).copied()
        } else {
            None
        }
    }
}

impl NeighborSearch for SpatialHashMap {
    fn for_each_neighbor<F: FnMut(u32)>(&self, pos: Vec3, radius: f32, mut f: F) {
        let mut out = Vec::new();
        self.query_radius(pos, radius, &mut out);
        for i in out {
            f(i);
        }
    }
}
