use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use glam::Affine3A;

use crate::collision::CollisionPrimitive;

/// Bone transforms of one skinned owner, in world space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkeletalPose {
    pub bones: Vec<Affine3A>,
}

impl SkeletalPose {
    pub fn new(bones: Vec<Affine3A>) -> Self {
        Self { bones }
    }
}

/// Per-owner skeletal transforms shared between the host and the solver.
///
/// The host may upload from any thread; the solver takes one snapshot per
/// step and reads only that.
#[derive(Clone, Default)]
pub struct TransformStore {
    poses: Arc<Mutex<HashMap<u32, SkeletalPose>>>,
}

impl TransformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload(&self, owner_id: u32, pose: SkeletalPose) {
        self.lock().insert(owner_id, pose);
    }

    pub fn remove(&self, owner_id: u32) -> Option<SkeletalPose> {
        self.lock().remove(&owner_id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current poses.
    pub fn snapshot(&self) -> TransformSnapshot {
        TransformSnapshot {
            poses: self.lock().clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, SkeletalPose>> {
        self.poses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Poses frozen for one step.
#[derive(Clone, Debug, Default)]
pub struct TransformSnapshot {
    poses: HashMap<u32, SkeletalPose>,
}

impl TransformSnapshot {
    /// Bone transform, identity when the owner or bone is unknown.
    pub fn resolve(&self, owner_id: u32, bone: usize) -> Affine3A {
        self.poses
            .get(&owner_id)
            .and_then(|p| p.bones.get(bone))
            .copied()
            .filter(|t| t.is_finite())
            .unwrap_or(Affine3A::IDENTITY)
    }

    /// Primitives with bone-relative poses moved into world space; others
    /// are copied unchanged.
    pub fn skin(&self, primitives: &[CollisionPrimitive], out: &mut Vec<CollisionPrimitive>) {
        out.clear();
        out.extend(primitives.iter().map(|prim| match prim.bone {
            Some(bone) => prim.posed(&self.resolve(prim.owner_id, bone)),
            None => prim.clone(),
        }));
    }
}
