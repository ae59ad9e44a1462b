use std::collections::TryReserveError;

use thiserror::Error;

/// Failures inside the engine.
///
/// None of these reach the per-frame API as a fault: callers observe them as
/// `Readiness::NotReady` or as "no feedback available yet".
#[derive(Debug, Error)]
pub enum FluidError {
    #[error("failed to allocate {what} for {requested} elements")]
    Allocation {
        what: &'static str,
        requested: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("feedback readback failed: {0}")]
    ReadbackFailed(String),

    #[error("feedback readback backend is unavailable")]
    BackendUnavailable,
}

/// Whether the solver can currently do work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}
