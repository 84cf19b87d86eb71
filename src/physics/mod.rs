//! Physics Module - box colliders handed to the host physics world

pub mod collider;

pub use collider::{create_aabb, ColliderHandle, ColliderSet, PhysicsWorld, AABB};
