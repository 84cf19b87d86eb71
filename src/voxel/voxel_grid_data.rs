//! Voxel grid data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in voxel_grid_operations.rs

use cgmath::{Matrix4, Point3};

/// Integer cell coordinates within the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelCoord {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// One grid cell and its running occupancy estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelBody {
    pub coord: VoxelCoord,
    /// Exponentially smoothed occupancy, always within [0, 1]
    pub probability: f32,
    /// probability > threshold
    pub active: bool,
}

/// Occupancy grid covering a fixed box of the world.
///
/// Bodies exist for the whole extent from construction on, stored x-major
/// (z varies fastest).
#[derive(Debug, Clone)]
pub struct VoxelGridData {
    /// World position of the minimum corner
    pub origin: Point3<f32>,
    pub extent: [u32; 3],
    pub voxel_size: f32,
    pub threshold: f32,
    pub default_factor: f32,
    pub bodies: Vec<VoxelBody>,
}

/// Camera used to project voxel centres into a depth frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// World to view space
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
}

/// What one depth integration pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthIntegrationStats {
    /// Voxels at the observed surface (hit = 1)
    pub occupied: usize,
    /// Voxels in free space in front of the surface (hit = 0)
    pub free: usize,
    /// Behind the camera, outside the frame, behind the surface or no depth
    pub unobserved: usize,
    pub activated: usize,
    pub deactivated: usize,
}
