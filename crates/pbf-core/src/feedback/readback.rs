//! Asynchronous transfer backends.
//!
//! A backend accepts a payload and hands back a handle that is polled on
//! later frames; nothing here ever blocks the caller.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::task::Poll;
use std::thread::JoinHandle;

use crate::error::FluidError;

/// An in-flight transfer.
pub trait PendingTransfer<T> {
    /// Non-blocking completion check. Returns `Ready` at most once.
    fn poll(&mut self) -> Poll<Result<T, FluidError>>;
}

/// Something that moves a payload asynchronously, e.g. a device-to-host copy.
pub trait AsyncTransfer<T> {
    type Pending: PendingTransfer<T>;

    fn enqueue(&mut self, payload: T) -> Result<Self::Pending, FluidError>;
}

/// Completes each transfer after a fixed number of polls.
///
/// Deterministic stand-in for a GPU readback that lands a frame or two
/// after it was issued.
#[derive(Clone, Copy, Debug)]
pub struct LatencyReadback {
    latency: u32,
}

impl LatencyReadback {
    pub fn new(latency: u32) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }
}

impl Default for LatencyReadback {
    fn default() -> Self {
        Self::new(super::PIPELINE_DEPTH as u32 - 1)
    }
}

pub struct LatencyTransfer<T> {
    payload: Option<T>,
    remaining: u32,
}

impl<T> PendingTransfer<T> for LatencyTransfer<T> {
    fn poll(&mut self) -> Poll<Result<T, FluidError>> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Poll::Pending;
        }
        match self.payload.take() {
            Some(p) => Poll::Ready(Ok(p)),
            None => Poll::Ready(Err(FluidError::ReadbackFailed(
                "transfer already consumed".into(),
            ))),
        }
    }
}

impl<T> AsyncTransfer<T> for LatencyReadback {
    type Pending = LatencyTransfer<T>;

    fn enqueue(&mut self, payload: T) -> Result<Self::Pending, FluidError> {
        Ok(LatencyTransfer {
            payload: Some(payload),
            remaining: self.latency,
        })
    }
}

struct CopyJob<T> {
    payload: T,
    reply: Sender<T>,
}

/// Transfers run on a dedicated copy thread; completion arrives over a
/// channel and is picked up with `try_recv`.
pub struct ThreadedReadback<T: Send + 'static> {
    jobs: Option<Sender<CopyJob<T>>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> ThreadedReadback<T> {
    pub fn new() -> Result<Self, FluidError> {
        let (tx, rx) = mpsc::channel::<CopyJob<T>>();
        let worker = std::thread::Builder::new()
            .name("pbf-readback".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    // Receiver gone means the request was abandoned.
                    let _ = job.reply.send(job.payload);
                }
            })
            .map_err(|e| {
                log::error!("failed to start readback worker: {}", e);
                FluidError::BackendUnavailable
            })?;
        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
        })
    }
}

pub struct ChannelTransfer<T> {
    reply: Option<Receiver<T>>,
}

impl<T> PendingTransfer<T> for ChannelTransfer<T> {
    fn poll(&mut self) -> Poll<Result<T, FluidError>> {
        let Some(rx) = &self.reply else {
            return Poll::Ready(Err(FluidError::ReadbackFailed(
                "transfer already consumed".into(),
            )));
        };
        match rx.try_recv() {
            Ok(payload) => {
                self.reply = None;
                Poll::Ready(Ok(payload))
            }
            Err(TryRecvError::Empty) => Poll::Pending,
            Err(TryRecvError::Disconnected) => {
                self.reply = None;
                Poll::Ready(Err(FluidError::BackendUnavailable))
            }
        }
    }
}

impl<T: Send + 'static> AsyncTransfer<T> for ThreadedReadback<T> {
    type Pending = ChannelTransfer<T>;

    fn enqueue(&mut self, payload: T) -> Result<Self::Pending, FluidError> {
        let jobs = self.jobs.as_ref().ok_or(FluidError::BackendUnavailable)?;
        let (reply, rx) = mpsc::channel();
        jobs.send(CopyJob { payload, reply })
            .map_err(|_| FluidError::BackendUnavailable)?;
        Ok(ChannelTransfer { reply: Some(rx) })
    }
}

impl<T: Send + 'static> Drop for ThreadedReadback<T> {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
