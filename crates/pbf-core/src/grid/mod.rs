//! Spatial indexing for neighbor queries.
//!
//! Two realizations share the same cell discretization (floored division of
//! each axis by the cell size):
//!
//! * [`SpatialHashMap`] keeps a growable index list per occupied cell and is
//!   used for incremental CPU-side work such as boundary sampling.
//! * [`SortedGrid`] sorts particles by Morton key and keeps a `[start, end)`
//!   range per cell. The solver rebuilds it every step.

pub mod hash_map;
pub mod morton;
pub mod neighbors;
pub mod sorted;

use glam::{IVec3, Vec3};

pub use hash_map::{SpatialHashMap, DEFAULT_PURGE_INTERVAL};
pub use neighbors::NeighborLists;
pub use sorted::{CellRange, SortedGrid};

/// Smallest accepted cell size. Smaller or non-finite values are clamped.
pub const MIN_CELL_SIZE: f32 = 1.0e-4;

/// Radius queries over an index built from a set of positions.
pub trait NeighborSearch {
    /// Calls `f(index)` for every indexed point within `radius` of `pos`.
    fn for_each_neighbor<F: FnMut(u32)>(&self, pos: Vec3, radius: f32, f: F);

    /// Collects the result of [`NeighborSearch::for_each_neighbor`].
    fn neighbors(&self, pos: Vec3, radius: f32) -> Vec<u32> {
        let mut out = Vec::new();
        self.for_each_neighbor(pos, radius, |i| out.push(i));
        out
    }
}

#[inline]
pub(crate) fn clamp_cell_size(cell_size: f32) -> f32 {
    if cell_size.is_finite() && cell_size > MIN_CELL_SIZE {
        cell_size
    } else {
        MIN_CELL_SIZE
    }
}

/// Convert world position to cell coordinates
#[inline]
pub(crate) fn cell_coords(pos: Vec3, inv_cell_size: f32) -> IVec3 {
    (pos * inv_cell_size).floor().as_ivec3()
}
