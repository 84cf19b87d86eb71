/// Voxel Module - Data-Oriented Programming (DOP) style
///
/// - voxel_grid_data.rs: occupancy grid, pure data
/// - voxel_grid_operations.rs: probability updates and depth integration
/// - landscape.rs: filled cells merged into physics box colliders

pub mod landscape;
pub mod voxel_grid_data;
pub mod voxel_grid_operations;

pub use voxel_grid_data::{
    CameraPose, DepthIntegrationStats, VoxelBody, VoxelCoord, VoxelGridData,
};

pub use voxel_grid_operations::{
    active_voxel_count, active_voxels, create_voxel_grid, integrate_depth_frame, observe_voxel,
    update_voxel_body, voxel_center, voxel_index, world_to_voxel,
};
pub use landscape::{
    create_landscape_for_grid, create_voxel_landscape, fill_from_grid, greedy_merge_boxes,
    is_filled, merge_box_aabb, set_filled, update_landscape, MergeBox, VoxelLandscape,
};
