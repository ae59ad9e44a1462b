use glam::Vec3;

use super::{MAX_COLLIDER_COUNT, MAX_COLLISION_FEEDBACK};

/// One resolved particle-collider contact.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CollisionFeedbackEntry {
    pub position: Vec3,
    pub velocity: Vec3,
    pub force: Vec3,
    /// Index of the collider in that frame's primitive list.
    pub collider: u32,
}

/// Everything the collision pass recorded during one step.
#[derive(Clone, Debug)]
pub struct FeedbackFrame {
    pub frame: u64,
    pub entries: Vec<CollisionFeedbackEntry>,
    /// Contacts per collider index, `MAX_COLLIDER_COUNT` long.
    pub counts: Vec<u32>,
    /// Entries that did not fit.
    pub dropped: u32,
}

impl FeedbackFrame {
    pub fn new(frame: u64) -> Self {
        Self {
            frame,
            entries: Vec::new(),
            counts: vec![0; MAX_COLLIDER_COUNT],
            dropped: 0,
        }
    }

    /// Reset for reuse under a new frame number, keeping allocations.
    pub fn reset(&mut self, frame: u64) {
        self.frame = frame;
        self.entries.clear();
        self.counts.clear();
        self.counts.resize(MAX_COLLIDER_COUNT, 0);
        self.dropped = 0;
    }

    /// Append an entry. When the buffer is full the new entry is dropped;
    /// colliders past `MAX_COLLIDER_COUNT` are recorded but not counted.
    pub fn record(&mut self, entry: CollisionFeedbackEntry) -> bool {
        if let Some(count) = self.counts.get_mut(entry.collider as usize) {
            *count = count.saturating_add(1);
        }
        if self.entries.len() >= MAX_COLLISION_FEEDBACK {
            self.dropped = self.dropped.saturating_add(1);
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FeedbackFrame {
    fn default() -> Self {
        Self::new(0)
    }
}
