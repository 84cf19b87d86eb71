//! Physics collaborator interface
//!
//! The physics body implementation lives with the host. The core only adds
//! and removes static box colliders through this trait.

use cgmath::Point3;
use rustc_hash::FxHashMap;

/// Axis-aligned box in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

pub fn create_aabb(min: Point3<f32>, max: Point3<f32>) -> AABB {
    AABB { min, max }
}

/// Collider handle issued by the physics world
pub type ColliderHandle = u32;

pub trait PhysicsWorld {
    /// Add a static box collider
    fn add_box(&mut self, aabb: &AABB) -> ColliderHandle;

    /// Remove a collider; false if the handle was unknown
    fn remove(&mut self, handle: ColliderHandle) -> bool;
}

/// In-memory collider store for hosts without a physics engine, and for tests
#[derive(Debug, Default)]
pub struct ColliderSet {
    pub colliders: FxHashMap<ColliderHandle, AABB>,
    pub next_handle: ColliderHandle,
}

impl ColliderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }
}

impl PhysicsWorld for ColliderSet {
    fn add_box(&mut self, aabb: &AABB) -> ColliderHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.colliders.insert(handle, *aabb);
        handle
    }

    fn remove(&mut self, handle: ColliderHandle) -> bool {
        self.colliders.remove(&handle).is_some()
    }
}
