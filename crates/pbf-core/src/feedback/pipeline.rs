use std::marker::PhantomData;
use std::task::Poll;

use super::readback::{AsyncTransfer, PendingTransfer};

struct InFlight<P> {
    epoch: u64,
    sequence: u64,
    pending: P,
}

/// Fixed ring of in-flight asynchronous transfers.
///
/// Payload `sequence` goes to slot `sequence % depth`. A slot still busy when
/// its turn comes round is evicted, so the ring never holds more than
/// `depth` requests and the producer never waits. Requests issued before the
/// last [`RingPipeline::invalidate`] still run to completion but their
/// payloads are discarded.
pub struct RingPipeline<T, B: AsyncTransfer<T>> {
    backend: B,
    slots: Vec<Option<InFlight<B::Pending>>>,
    epoch: u64,
    evicted: u64,
    _payload: PhantomData<fn(T) -> T>,
}

impl<T, B: AsyncTransfer<T>> RingPipeline<T, B> {
    pub fn new(backend: B, depth: usize) -> Self {
        let depth = depth.max(1);
        let mut slots = Vec::with_capacity(depth);
        slots.resize_with(depth, || None);
        Self {
            backend,
            slots,
            epoch: 0,
            evicted: 0,
            _payload: PhantomData,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Requests dropped because their slot was needed again before they completed.
    #[inline]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Issue a transfer for `payload`. Returns false when the backend refused it.
    pub fn submit(&mut self, sequence: u64, payload: T) -> bool {
        let slot = (sequence % self.slots.len() as u64) as usize;
        if let Some(stale) = self.slots[slot].take() {
            self.evicted += 1;
            log::debug!(
                "readback slot {} still busy with sequence {}, evicting for {}",
                slot,
                stale.sequence,
                sequence
            );
        }
        match self.backend.enqueue(payload) {
            Ok(pending) => {
                self.slots[slot] = Some(InFlight {
                    epoch: self.epoch,
                    sequence,
                    pending,
                });
                true
            }
            Err(e) => {
                log::warn!("readback for sequence {} not issued: {}", sequence, e);
                false
            }
        }
    }

    /// Poll every slot once, oldest sequence first. Completed payloads of the
    /// current epoch are passed to `on_complete`.
    pub fn poll<F: FnMut(u64, T)>(&mut self, mut on_complete: F) {
        let mut order: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].is_some())
            .collect();
        order.sort_by_key(|&i| self.slots[i].as_ref().map_or(0, |s| s.sequence));

        for i in order {
            let Some(flight) = self.slots[i].as_mut() else {
                continue;
            };
            match flight.pending.poll() {
                Poll::Pending => {}
                Poll::Ready(result) => {
                    let (epoch, sequence) = (flight.epoch, flight.sequence);
                    self.slots[i] = None;
                    match result {
                        Ok(payload) if epoch == self.epoch => on_complete(sequence, payload),
                        Ok(_) => {
                            log::debug!("discarding readback {} from a previous epoch", sequence);
                        }
                        Err(e) => log::warn!("readback {} failed: {}", sequence, e),
                    }
                }
            }
        }
    }

    /// Mark everything currently in flight as stale.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
    }
}
