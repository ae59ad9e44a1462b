use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::SortedGrid;

/// Per-particle neighbor lists in compressed-row form.
///
/// Gathered once per step after the index build; constraint iterations then
/// walk `neighbors(i)` instead of re-querying the grid.
#[derive(Default)]
pub struct NeighborLists {
    offsets: Vec<u32>,
    indices: Vec<u32>,
}

impl NeighborLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// For each query point, collect indexed points of `grid` within `radius`.
    pub fn gather(&mut self, grid: &SortedGrid, queries: &[Vec3], radius: f32) {
        self.offsets.clear();
        self.indices.clear();
        self.offsets.reserve(queries.len() + 1);
        self.offsets.push(0);

        #[cfg(feature = "parallel")]
        {
            let lists: Vec<Vec<u32>> = queries
                .par_iter()
                .map(|&q| {
                    let mut list = Vec::new();
                    grid.for_each_in_radius(q, radius, |j| list.push(j));
                    list
                })
                .collect();
            for list in lists {
                self.indices.extend_from_slice(&list);
                self.offsets.push(self.indices.len() as u32);
            }
        }

        #[cfg(not(feature = "parallel"))]
        {
            for &q in queries {
                let indices = &mut self.indices;
                grid.for_each_in_radius(q, radius, |j| indices.push(j));
                self.offsets.push(self.indices.len() as u32);
            }
        }
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
        self.indices.clear();
    }

    #[inline]
    pub fn neighbors(&self, i: usize) -> &[u32] {
        match (self.offsets.get(i), self.offsets.get(i + 1)) {
            (Some(&a), Some(&b)) => &self.indices[a as usize..b as usize],
            _ => &[],
        }
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total neighbor entries across all rows.
    #[inline]
    pub fn total(&self) -> usize {
        self.indices.len()
    }
}
