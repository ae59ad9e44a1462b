//! Collision feedback reporting.
//!
//! The collision pass records a [`FeedbackFrame`] per step. Frames are handed
//! to an asynchronous transfer ring ([`RingPipeline`]); whichever transfer
//! completes is copied into a shared snapshot that gameplay code polls
//! through a [`FeedbackReader`]. The snapshot is always a whole completed
//! frame, at most `PIPELINE_DEPTH - 1` frames old.

pub mod frame;
pub mod pipeline;
pub mod readback;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use frame::{CollisionFeedbackEntry, FeedbackFrame};
pub use pipeline::RingPipeline;
pub use readback::{AsyncTransfer, LatencyReadback, PendingTransfer, ThreadedReadback};

pub const MAX_COLLISION_FEEDBACK: usize = 4096;
pub const MAX_COLLIDER_COUNT: usize = 256;
pub const PIPELINE_DEPTH: usize = 3;

#[derive(Default)]
struct Snapshot {
    frame: Option<u64>,
    entries: Vec<CollisionFeedbackEntry>,
    counts: Vec<u32>,
}

/// Result of a feedback query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedbackQuery {
    pub entries: Vec<CollisionFeedbackEntry>,
    pub count: usize,
    /// False until the first transfer completes after enabling.
    pub available: bool,
}

/// Thread-safe read side of the feedback snapshot.
#[derive(Clone)]
pub struct FeedbackReader {
    snapshot: Arc<Mutex<Snapshot>>,
}

impl FeedbackReader {
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every entry of the latest completed frame.
    pub fn all(&self) -> FeedbackQuery {
        let snap = self.lock();
        if snap.frame.is_none() {
            return FeedbackQuery::default();
        }
        FeedbackQuery {
            entries: snap.entries.clone(),
            count: snap.entries.len(),
            available: true,
        }
    }

    /// Entries of the latest completed frame for one collider.
    pub fn for_collider(&self, collider: u32) -> FeedbackQuery {
        let snap = self.lock();
        if snap.frame.is_none() {
            return FeedbackQuery::default();
        }
        let entries: Vec<_> = snap
            .entries
            .iter()
            .filter(|e| e.collider == collider)
            .copied()
            .collect();
        FeedbackQuery {
            count: entries.len(),
            entries,
            available: true,
        }
    }

    /// Contact count for a collider, including contacts whose entries were
    /// dropped for capacity. `None` while no feedback is available.
    pub fn contact_count(&self, collider: u32) -> Option<u32> {
        let snap = self.lock();
        snap.frame?;
        Some(snap.counts.get(collider as usize).copied().unwrap_or(0))
    }

    /// Step number the snapshot was recorded on.
    pub fn frame(&self) -> Option<u64> {
        self.lock().frame
    }

    pub fn is_available(&self) -> bool {
        self.lock().frame.is_some()
    }
}

/// Producer side: owns the transfer ring and publishes completed frames.
pub struct FeedbackPipeline<B: AsyncTransfer<FeedbackFrame> = LatencyReadback> {
    ring: RingPipeline<FeedbackFrame, B>,
    snapshot: Arc<Mutex<Snapshot>>,
    spare: Vec<FeedbackFrame>,
    enabled: bool,
}

impl FeedbackPipeline<LatencyReadback> {
    pub fn with_latency(latency: u32) -> Self {
        Self::new(LatencyReadback::new(latency))
    }
}

impl<B: AsyncTransfer<FeedbackFrame>> FeedbackPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            ring: RingPipeline::new(backend, PIPELINE_DEPTH),
            snapshot: Arc::new(Mutex::new(Snapshot::default())),
            spare: Vec::new(),
            enabled: false,
        }
    }

    pub fn reader(&self) -> FeedbackReader {
        FeedbackReader {
            snapshot: Arc::clone(&self.snapshot),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ring(&self) -> &RingPipeline<FeedbackFrame, B> {
        &self.ring
    }

    /// Turning feedback off lets in-flight transfers finish but discards
    /// them, and clears the snapshot so a later enable never reports data
    /// recorded before the disable.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.ring.invalidate();
        }
        let mut snap = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        snap.frame = None;
        snap.entries.clear();
        snap.counts.clear();
        log::info!("collision feedback {}", if enabled { "enabled" } else { "disabled" });
    }

    /// An empty frame for the collision pass to record into, reusing
    /// storage from frames already published.
    pub fn take_frame(&mut self, frame: u64) -> FeedbackFrame {
        match self.spare.pop() {
            Some(mut f) => {
                f.reset(frame);
                f
            }
            None => FeedbackFrame::new(frame),
        }
    }

    /// Hand a recorded frame to the transfer ring. Ignored while disabled.
    pub fn submit(&mut self, frame: FeedbackFrame) {
        if !self.enabled {
            self.recycle(frame);
            return;
        }
        let sequence = frame.frame;
        self.ring.submit(sequence, frame);
    }

    /// Collect completed transfers and publish the newest one.
    pub fn poll(&mut self) {
        let Self {
            ring,
            snapshot,
            spare,
            ..
        } = self;
        ring.poll(|sequence, mut frame| {
            {
                let mut snap = snapshot.lock().unwrap_or_else(PoisonError::into_inner);
                if snap.frame.map_or(true, |f| sequence > f) {
                    snap.frame = Some(sequence);
                    std::mem::swap(&mut snap.entries, &mut frame.entries);
                    std::mem::swap(&mut snap.counts, &mut frame.counts);
                }
            }
            if spare.len() < PIPELINE_DEPTH {
                spare.push(frame);
            }
        });
    }

    fn recycle(&mut self, frame: FeedbackFrame) {
        if self.spare.len() < PIPELINE_DEPTH {
            self.spare.push(frame);
        }
    }
}
