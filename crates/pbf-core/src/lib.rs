//! Position-based fluid simulation core.
//!
//! [`FluidSolver`] advances a particle fluid against per-frame collision
//! primitives, with boundary particles for density near walls, optional
//! surface attachment and an asynchronous collision feedback pipeline.

pub mod attachment;
pub mod boundary;
pub mod collision;
pub mod config;
pub mod constraints;
pub mod error;
pub mod feedback;
pub mod fluids;
pub mod grid;
pub mod materials;
pub mod math;
pub mod particle;
pub mod quality;
pub mod render;
pub mod solver;
pub mod transforms;

pub use collision::{CollisionPrimitive, DistanceField, Plane};
pub use config::{EvictionPolicy, FluidConfig};
pub use error::{FluidError, Readiness};
pub use feedback::{FeedbackQuery, FeedbackReader};
pub use render::RenderParticle;
pub use solver::FluidSolver;
pub use transforms::{SkeletalPose, TransformStore};
