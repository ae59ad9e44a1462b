use glam::Vec3;

use crate::attachment::Attachment;
use crate::collision::Contact;
use crate::error::FluidError;

/// Per-particle state bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ParticleFlags(pub u32);

impl ParticleFlags {
    pub const ACTIVE: Self = Self(1 << 0);
    /// At least one boundary particle inside the smoothing radius this step.
    pub const BOUNDARY_ADJACENT: Self = Self(1 << 1);
    pub const ATTACHED: Self = Self(1 << 2);
    /// Resolved against a collider this step.
    pub const COLLIDED: Self = Self(1 << 3);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    #[inline]
    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

/// SoA particle storage.
///
/// Every vector has the same length (`len()`). Indices are not stable across
/// `despawn`; `particle_id` is.
pub struct ParticleSet {
    capacity: usize,
    /// Push counter; never wraps in practice, unlike the caller's `u32` ids.
    next_sequence: u64,
    /// Push order per particle, for eviction.
    sequence: Vec<u64>,
    pub position: Vec<Vec3>,
    /// Predicted positions for constraint solving
    pub predicted: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    /// Current SPH density estimate
    pub density: Vec<f32>,
    /// PBF Lagrange multiplier
    pub lambda: Vec<f32>,
    /// Fluid neighbors found at the last index build. Diagnostics only.
    pub neighbor_count: Vec<u32>,
    pub particle_id: Vec<u32>,
    /// Emission batch that created the particle.
    pub source_id: Vec<u32>,
    pub flags: Vec<ParticleFlags>,
    /// Accumulated position corrections (Jacobi)
    pub corrections: Vec<Vec3>,
    pub attachment: Vec<Attachment>,
    /// Collider contact from this step, consumed by the velocity response.
    pub contact: Vec<Option<Contact>>,
}

impl ParticleSet {
    /// A set that holds nothing and never grows.
    pub const EMPTY: Self = Self {
        capacity: 0,
        next_sequence: 0,
        sequence: Vec::new(),
        position: Vec::new(),
        predicted: Vec::new(),
        velocity: Vec::new(),
        density: Vec::new(),
        lambda: Vec::new(),
        neighbor_count: Vec::new(),
        particle_id: Vec::new(),
        source_id: Vec::new(),
        flags: Vec::new(),
        corrections: Vec::new(),
        attachment: Vec::new(),
        contact: Vec::new(),
    };

    /// Empty set with room for `capacity` particles, allocated up front.
    pub fn with_capacity(capacity: usize) -> Result<Self, FluidError> {
        let mut set = Self {
            capacity,
            ..Self::EMPTY
        };
        set.reserve_all()?;
        Ok(set)
    }

    fn reserve_all(&mut self) -> Result<(), FluidError> {
        let n = self.capacity;
        reserve(&mut self.sequence, n, "spawn sequence")?;
        reserve(&mut self.position, n, "positions")?;
        reserve(&mut self.predicted, n, "predicted positions")?;
        reserve(&mut self.velocity, n, "velocities")?;
        reserve(&mut self.density, n, "densities")?;
        reserve(&mut self.lambda, n, "lambdas")?;
        reserve(&mut self.neighbor_count, n, "neighbor counts")?;
        reserve(&mut self.particle_id, n, "particle ids")?;
        reserve(&mut self.source_id, n, "source ids")?;
        reserve(&mut self.flags, n, "flags")?;
        reserve(&mut self.corrections, n, "corrections")?;
        reserve(&mut self.attachment, n, "attachments")?;
        reserve(&mut self.contact, n, "contacts")?;
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.position.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Append a particle. Returns its index, or `None` when full.
    pub fn push(
        &mut self,
        position: Vec3,
        velocity: Vec3,
        particle_id: u32,
        source_id: u32,
    ) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.sequence.push(self.next_sequence);
        self.next_sequence += 1;
        self.position.push(position);
        self.predicted.push(position);
        self.velocity.push(velocity);
        self.density.push(0.0);
        self.lambda.push(0.0);
        self.neighbor_count.push(0);
        self.particle_id.push(particle_id);
        self.source_id.push(source_id);
        self.flags.push(ParticleFlags::ACTIVE);
        self.corrections.push(Vec3::ZERO);
        self.attachment.push(Attachment::default());
        self.contact.push(None);
        Some(self.len() - 1)
    }

    /// Remove particle `index` by moving the last particle into its slot.
    pub fn swap_remove(&mut self, index: usize) -> bool {
        if index >= self.len() {
            return false;
        }
        self.sequence.swap_remove(index);
        self.position.swap_remove(index);
        self.predicted.swap_remove(index);
        self.velocity.swap_remove(index);
        self.density.swap_remove(index);
        self.lambda.swap_remove(index);
        self.neighbor_count.swap_remove(index);
        self.particle_id.swap_remove(index);
        self.source_id.swap_remove(index);
        self.flags.swap_remove(index);
        self.corrections.swap_remove(index);
        self.attachment.swap_remove(index);
        self.contact.swap_remove(index);
        true
    }

    /// Drop every particle, keeping the allocation.
    pub fn clear(&mut self) {
        self.sequence.clear();
        self.position.clear();
        self.predicted.clear();
        self.velocity.clear();
        self.density.clear();
        self.lambda.clear();
        self.neighbor_count.clear();
        self.particle_id.clear();
        self.source_id.clear();
        self.flags.clear();
        self.corrections.clear();
        self.attachment.clear();
        self.contact.clear();
    }

    /// Index of the earliest pushed particle still alive.
    pub fn oldest(&self) -> Option<usize> {
        self.sequence
            .iter()
            .enumerate()
            .min_by_key(|(_, seq)| **seq)
            .map(|(i, _)| i)
    }

    pub fn index_of(&self, particle_id: u32) -> Option<usize> {
        self.particle_id.iter().position(|&id| id == particle_id)
    }
}

fn reserve<T>(v: &mut Vec<T>, n: usize, what: &'static str) -> Result<(), FluidError> {
    v.try_reserve_exact(n).map_err(|source| FluidError::Allocation {
        what,
        requested: n,
        source,
    })
}
