//! Voxel Grid Operations - Pure DOP Functions
//!
//! Occupancy update: p = clamp(p * (1 - factor) + factor * hit, 0, 1),
//! active = p > threshold.

use super::voxel_grid_data::{
    CameraPose, DepthIntegrationStats, VoxelBody, VoxelCoord, VoxelGridData,
};
use crate::config::VoxelConfig;
use crate::depth::{get_depth_in_meters, DepthFrame};
use crate::error::{EngineError, EngineResult, OptionExt};
use cgmath::{Matrix4, Point3, Transform, Vector4};

/// Build a grid with a body for every cell of the configured extent
pub fn create_voxel_grid(config: &VoxelConfig) -> EngineResult<VoxelGridData> {
    if config.extent.iter().any(|&e| e == 0) {
        return Err(EngineError::InvalidConfig {
            field: "voxel.extent".to_string(),
            value: format!("{:?}", config.extent),
            reason: "every axis needs at least one cell".to_string(),
        });
    }
    if !(config.voxel_size > 0.0) {
        return Err(EngineError::InvalidConfig {
            field: "voxel.voxel_size".to_string(),
            value: config.voxel_size.to_string(),
            reason: "must be positive".to_string(),
        });
    }

    let [ex, ey, ez] = config.extent;
    let mut bodies = Vec::with_capacity(ex as usize * ey as usize * ez as usize);
    for x in 0..ex {
        for y in 0..ey {
            for z in 0..ez {
                bodies.push(VoxelBody {
                    coord: VoxelCoord { x, y, z },
                    probability: 0.0,
                    active: false,
                });
            }
        }
    }

    log::info!(
        "[voxel_grid_operations::create_voxel_grid] Created {}x{}x{} grid ({} bodies, {}m cells)",
        ex,
        ey,
        ez,
        bodies.len(),
        config.voxel_size
    );

    Ok(VoxelGridData {
        origin: Point3::new(config.origin[0], config.origin[1], config.origin[2]),
        extent: config.extent,
        voxel_size: config.voxel_size,
        threshold: config.threshold,
        default_factor: config.default_factor,
        bodies,
    })
}

/// Flat index of a cell, None outside the extent
pub fn voxel_index(grid: &VoxelGridData, coord: VoxelCoord) -> Option<usize> {
    let [ex, ey, ez] = grid.extent;
    if coord.x >= ex || coord.y >= ey || coord.z >= ez {
        return None;
    }
    Some((coord.x as usize * ey as usize + coord.y as usize) * ez as usize + coord.z as usize)
}

/// World-space centre of a cell
pub fn voxel_center(grid: &VoxelGridData, coord: VoxelCoord) -> Point3<f32> {
    let half = grid.voxel_size * 0.5;
    Point3::new(
        grid.origin.x + coord.x as f32 * grid.voxel_size + half,
        grid.origin.y + coord.y as f32 * grid.voxel_size + half,
        grid.origin.z + coord.z as f32 * grid.voxel_size + half,
    )
}

/// Cell containing a world point, None outside the grid
pub fn world_to_voxel(grid: &VoxelGridData, point: Point3<f32>) -> Option<VoxelCoord> {
    let local = (point - grid.origin) / grid.voxel_size;
    if local.x < 0.0 || local.y < 0.0 || local.z < 0.0 {
        return None;
    }
    let coord = VoxelCoord {
        x: local.x.floor() as u32,
        y: local.y.floor() as u32,
        z: local.z.floor() as u32,
    };
    voxel_index(grid, coord).map(|_| coord)
}

/// Fold one observation into a body. Returns true when `active` flipped.
pub fn update_voxel_body(body: &mut VoxelBody, hit: f32, factor: f32, threshold: f32) -> bool {
    body.probability = (body.probability * (1.0 - factor) + factor * hit).clamp(0.0, 1.0);
    let active = body.probability > threshold;
    let flipped = active != body.active;
    body.active = active;
    flipped
}

/// Observe a single cell. Returns true when its `active` flag flipped.
pub fn observe_voxel(
    grid: &mut VoxelGridData,
    coord: VoxelCoord,
    hit: f32,
    factor: f32,
) -> EngineResult<bool> {
    let index = voxel_index(grid, coord).ok_or_engine(|| EngineError::ResourceNotFound {
        resource_type: "voxel".to_string(),
        id: format!("({}, {}, {})", coord.x, coord.y, coord.z),
    })?;
    let threshold = grid.threshold;
    Ok(update_voxel_body(&mut grid.bodies[index], hit, factor, threshold))
}

pub fn active_voxels(grid: &VoxelGridData) -> impl Iterator<Item = &VoxelBody> + '_ {
    grid.bodies.iter().filter(|body| body.active)
}

pub fn active_voxel_count(grid: &VoxelGridData) -> usize {
    active_voxels(grid).count()
}

/// Integrate a depth frame into the grid.
///
/// Each voxel centre is projected through the camera into normalized view
/// coordinates, mapped by the frame's `norm_uv_transform` to a depth pixel,
/// and compared with its own view-space depth:
/// - within half a voxel of the surface: hit = 1
/// - in front of the surface: hit = 0
/// - behind the surface, off-frame, or without depth: not observed
pub fn integrate_depth_frame(
    grid: &mut VoxelGridData,
    frame: &DepthFrame,
    camera: &CameraPose,
) -> EngineResult<DepthIntegrationStats> {
    let view_projection = camera.projection * camera.view;
    let half_voxel = grid.voxel_size * 0.5;
    let factor = grid.default_factor;
    let threshold = grid.threshold;
    let mut stats = DepthIntegrationStats::default();

    if frame.width == 0 || frame.height == 0 {
        stats.unobserved = grid.bodies.len();
        return Ok(stats);
    }

    for index in 0..grid.bodies.len() {
        let center = voxel_center(grid, grid.bodies[index].coord);

        let Some((px, py)) = project_to_depth_pixel(&view_projection, frame, center) else {
            stats.unobserved += 1;
            continue;
        };

        let surface = get_depth_in_meters(frame, px, py)?;
        if surface <= 0.0 {
            stats.unobserved += 1;
            continue;
        }

        let voxel_depth = -camera.view.transform_point(center).z;
        let hit = if (voxel_depth - surface).abs() <= half_voxel {
            stats.occupied += 1;
            1.0
        } else if voxel_depth < surface {
            stats.free += 1;
            0.0
        } else {
            stats.unobserved += 1;
            continue;
        };

        let body = &mut grid.bodies[index];
        if update_voxel_body(body, hit, factor, threshold) {
            if body.active {
                stats.activated += 1;
            } else {
                stats.deactivated += 1;
            }
        }
    }

    log::trace!(
        "[voxel_grid_operations::integrate_depth_frame] {} occupied, {} free, {} unobserved",
        stats.occupied,
        stats.free,
        stats.unobserved
    );
    Ok(stats)
}

// World point -> clip -> NDC -> normalized view uv -> depth pixel
fn project_to_depth_pixel(
    view_projection: &Matrix4<f32>,
    frame: &DepthFrame,
    point: Point3<f32>,
) -> Option<(u32, u32)> {
    let clip = *view_projection * Vector4::new(point.x, point.y, point.z, 1.0);
    if clip.w <= 0.0 {
        return None;
    }
    let ndc_x = clip.x / clip.w;
    let ndc_y = clip.y / clip.w;
    if !(-1.0..=1.0).contains(&ndc_x) || !(-1.0..=1.0).contains(&ndc_y) {
        return None;
    }

    // Same convention as the occlusion shader: origin bottom-left
    let view_uv = Vector4::new((ndc_x + 1.0) * 0.5, (ndc_y + 1.0) * 0.5, 0.0, 1.0);
    let depth_uv = frame.norm_uv_transform * view_uv;
    if !(0.0..1.0).contains(&depth_uv.x) || !(0.0..1.0).contains(&depth_uv.y) {
        return None;
    }

    let px = (depth_uv.x * frame.width as f32) as u32;
    let py = (depth_uv.y * frame.height as f32) as u32;
    Some((px.min(frame.width - 1), py.min(frame.height - 1)))
}
