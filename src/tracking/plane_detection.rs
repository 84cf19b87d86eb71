//! Plane detection synchronizer
//!
//! Each frame the platform's live plane set is reconciled against the tracked
//! records: vanished planes are removed (mesh detached in the same frame), new
//! planes get a record and mesh, and planes whose change time advanced get
//! their geometry rebuilt. Every record maps to exactly one live plane.

use super::frame_input::{DetectedPlane, PlaneHandle, XrFrameInput};
use super::session::{require_feature, XrSession};
use crate::config::XrFeature;
use crate::error::EngineResult;
use crate::scene::{
    attach_node, detach_node, set_node_mesh, set_node_transform, set_node_visible, MeshData,
    NodeId, SceneGraph,
};
use cgmath::{Matrix4, SquareMatrix};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};

// Process-wide so ids are never reused, even across trackers
static NEXT_PLANE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPlane {
    pub id: u64,
    pub last_changed_time: f64,
    pub mesh: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneEvent {
    Added { handle: PlaneHandle, id: u64 },
    Updated { handle: PlaneHandle, id: u64 },
    Removed { handle: PlaneHandle, id: u64 },
}

#[derive(Debug, Default)]
pub struct PlaneTrackerState {
    pub planes: FxHashMap<PlaneHandle, TrackedPlane>,
}

pub fn create_plane_tracker() -> PlaneTrackerState {
    PlaneTrackerState::default()
}

/// Fan triangulation: vertex 0 with each consecutive pair of the rest
pub fn triangulate_plane_polygon(polygon: &[[f32; 3]]) -> MeshData {
    let mut indices = Vec::with_capacity(polygon.len().saturating_sub(2) * 3);
    for i in 1..polygon.len().saturating_sub(1) {
        indices.extend_from_slice(&[0, i as u32, i as u32 + 1]);
    }
    MeshData {
        positions: polygon.to_vec(),
        indices,
    }
}

/// Reconcile tracked planes with the platform's report for this frame.
///
/// Requires plane detection to be enabled in the session. A frame without a
/// plane set leaves every record untouched.
pub fn update_planes(
    state: &mut PlaneTrackerState,
    session: &XrSession,
    frame: &XrFrameInput,
    scene: &mut SceneGraph,
) -> EngineResult<Vec<PlaneEvent>> {
    require_feature(session, XrFeature::PlaneDetection)?;

    let Some(detected) = frame.detected_planes.as_ref() else {
        return Ok(Vec::new());
    };

    let mut events = Vec::new();
    let live: FxHashSet<PlaneHandle> = detected.iter().map(|plane| plane.handle).collect();

    // Removed planes first so a reused scene slot never sees two meshes
    let mut removed: Vec<PlaneHandle> = state
        .planes
        .keys()
        .filter(|handle| !live.contains(handle))
        .copied()
        .collect();
    removed.sort_by_key(|handle| handle.0);
    for handle in removed {
        if let Some(record) = state.planes.remove(&handle) {
            detach_node(scene, record.mesh);
            log::debug!("[plane_detection::update_planes] Plane {} removed", record.id);
            events.push(PlaneEvent::Removed {
                handle,
                id: record.id,
            });
        }
    }

    for plane in detected {
        match state.planes.get_mut(&plane.handle) {
            None => {
                let record = add_plane(plane, scene);
                log::debug!(
                    "[plane_detection::update_planes] Plane {} added ({} vertices)",
                    record.id,
                    plane.polygon.len()
                );
                events.push(PlaneEvent::Added {
                    handle: plane.handle,
                    id: record.id,
                });
                state.planes.insert(plane.handle, record);
            }
            Some(record) => {
                if plane.last_changed_time > record.last_changed_time {
                    set_node_mesh(scene, record.mesh, triangulate_plane_polygon(&plane.polygon));
                    record.last_changed_time = plane.last_changed_time;
                    events.push(PlaneEvent::Updated {
                        handle: plane.handle,
                        id: record.id,
                    });
                }
            }
        }

        if let Some(record) = state.planes.get(&plane.handle) {
            apply_plane_pose(scene, record.mesh, plane);
        }
    }

    Ok(events)
}

/// Remove every record and mesh, e.g. when the session ends
pub fn clear_planes(state: &mut PlaneTrackerState, scene: &mut SceneGraph) -> Vec<PlaneEvent> {
    let mut events: Vec<PlaneEvent> = state
        .planes
        .drain()
        .map(|(handle, record)| {
            detach_node(scene, record.mesh);
            PlaneEvent::Removed {
                handle,
                id: record.id,
            }
        })
        .collect();
    events.sort_by_key(|event| match event {
        PlaneEvent::Added { id, .. } | PlaneEvent::Updated { id, .. } | PlaneEvent::Removed { id, .. } => *id,
    });
    events
}

fn add_plane(plane: &DetectedPlane, scene: &mut SceneGraph) -> TrackedPlane {
    let mesh = attach_node(
        scene,
        Matrix4::identity(),
        Some(triangulate_plane_polygon(&plane.polygon)),
        None,
    );
    TrackedPlane {
        id: NEXT_PLANE_ID.fetch_add(1, Ordering::Relaxed),
        last_changed_time: plane.last_changed_time,
        mesh,
    }
}

// Unresolvable pose hides the mesh; the record stays
fn apply_plane_pose(scene: &mut SceneGraph, mesh: NodeId, plane: &DetectedPlane) {
    match plane.pose {
        Some(pose) => {
            set_node_transform(scene, mesh, pose);
            set_node_visible(scene, mesh, true);
        }
        None => set_node_visible(scene, mesh, false),
    }
}
