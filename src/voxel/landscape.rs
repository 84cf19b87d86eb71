//! Voxel landscape - filled cells merged into box colliders
//!
//! `update_landscape` rebuilds from scratch: every previous collider is
//! removed, then filled cells are greedily merged into axis-aligned boxes and
//! each box becomes one collider. The merge is deterministic for a given
//! fill map but does not minimise the box count.

use super::voxel_grid_data::VoxelGridData;
use crate::error::{EngineError, EngineResult};
use crate::physics::{create_aabb, ColliderHandle, PhysicsWorld, AABB};
use bit_vec::BitVec;
use cgmath::Point3;

/// One merged run of cells, in cell units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeBox {
    pub min: [u32; 3],
    pub size: [u32; 3],
}

pub struct VoxelLandscape {
    pub origin: Point3<f32>,
    pub extent: [u32; 3],
    pub voxel_size: f32,
    /// One bit per cell, x-major like the occupancy grid
    pub filled: BitVec,
    /// Colliders added by the last update
    pub colliders: Vec<ColliderHandle>,
    /// Boxes emitted by the last update
    pub boxes: Vec<MergeBox>,
}

pub fn create_voxel_landscape(origin: Point3<f32>, extent: [u32; 3], voxel_size: f32) -> VoxelLandscape {
    let cells = extent[0] as usize * extent[1] as usize * extent[2] as usize;
    VoxelLandscape {
        origin,
        extent,
        voxel_size,
        filled: BitVec::from_elem(cells, false),
        colliders: Vec::new(),
        boxes: Vec::new(),
    }
}

/// Landscape with the same placement and extent as an occupancy grid
pub fn create_landscape_for_grid(grid: &VoxelGridData) -> VoxelLandscape {
    create_voxel_landscape(grid.origin, grid.extent, grid.voxel_size)
}

fn cell_index(extent: [u32; 3], x: u32, y: u32, z: u32) -> usize {
    (x as usize * extent[1] as usize + y as usize) * extent[2] as usize + z as usize
}

pub fn set_filled(landscape: &mut VoxelLandscape, cell: [u32; 3], filled: bool) -> EngineResult<()> {
    let [x, y, z] = cell;
    let [ex, ey, ez] = landscape.extent;
    if x >= ex || y >= ey || z >= ez {
        return Err(EngineError::BufferAccess {
            index: cell_index(landscape.extent, x, y, z),
            size: landscape.filled.len(),
        });
    }
    landscape.filled.set(cell_index(landscape.extent, x, y, z), filled);
    Ok(())
}

pub fn is_filled(landscape: &VoxelLandscape, cell: [u32; 3]) -> bool {
    let [x, y, z] = cell;
    let [ex, ey, ez] = landscape.extent;
    x < ex
        && y < ey
        && z < ez
        && landscape
            .filled
            .get(cell_index(landscape.extent, x, y, z))
            .unwrap_or(false)
}

/// Copy the grid's active flags into the fill map
pub fn fill_from_grid(landscape: &mut VoxelLandscape, grid: &VoxelGridData) -> EngineResult<()> {
    if landscape.extent != grid.extent {
        return Err(EngineError::InvalidConfig {
            field: "voxel.extent".to_string(),
            value: format!("{:?}", grid.extent),
            reason: format!("landscape extent is {:?}", landscape.extent),
        });
    }
    for (index, body) in grid.bodies.iter().enumerate() {
        landscape.filled.set(index, body.active);
    }
    Ok(())
}

/// Greedy merge over filled cells.
///
/// Cells are visited x-major, then y, then z. From each filled, unboxed cell a
/// run grows along X as far as possible, then along Y keeping the X run, then
/// along Z keeping the X/Y rectangle.
pub fn greedy_merge_boxes(extent: [u32; 3], filled: &BitVec) -> Vec<MergeBox> {
    let [ex, ey, ez] = extent;
    let mut boxed = BitVec::from_elem(filled.len(), false);
    let open = |boxed: &BitVec, x: u32, y: u32, z: u32| {
        let index = cell_index(extent, x, y, z);
        filled.get(index).unwrap_or(false) && !boxed.get(index).unwrap_or(true)
    };

    let mut boxes = Vec::new();
    for x in 0..ex {
        for y in 0..ey {
            for z in 0..ez {
                if !open(&boxed, x, y, z) {
                    continue;
                }

                let mut w = 1;
                while x + w < ex && open(&boxed, x + w, y, z) {
                    w += 1;
                }

                let mut h = 1;
                'grow_y: while y + h < ey {
                    for i in 0..w {
                        if !open(&boxed, x + i, y + h, z) {
                            break 'grow_y;
                        }
                    }
                    h += 1;
                }

                let mut d = 1;
                'grow_z: while z + d < ez {
                    for i in 0..w {
                        for j in 0..h {
                            if !open(&boxed, x + i, y + j, z + d) {
                                break 'grow_z;
                            }
                        }
                    }
                    d += 1;
                }

                for i in 0..w {
                    for j in 0..h {
                        for k in 0..d {
                            boxed.set(cell_index(extent, x + i, y + j, z + k), true);
                        }
                    }
                }
                boxes.push(MergeBox {
                    min: [x, y, z],
                    size: [w, h, d],
                });
            }
        }
    }
    boxes
}

/// World-space bounds of a merged box
pub fn merge_box_aabb(landscape: &VoxelLandscape, merged: &MergeBox) -> AABB {
    let s = landscape.voxel_size;
    let o = landscape.origin;
    let min = Point3::new(
        o.x + merged.min[0] as f32 * s,
        o.y + merged.min[1] as f32 * s,
        o.z + merged.min[2] as f32 * s,
    );
    let max = Point3::new(
        min.x + merged.size[0] as f32 * s,
        min.y + merged.size[1] as f32 * s,
        min.z + merged.size[2] as f32 * s,
    );
    create_aabb(min, max)
}

/// Rebuild every collider from the current fill map. Returns the box count.
pub fn update_landscape(landscape: &mut VoxelLandscape, physics: &mut dyn PhysicsWorld) -> usize {
    let stale = landscape.colliders.len();
    for handle in landscape.colliders.drain(..) {
        if !physics.remove(handle) {
            log::warn!(
                "[landscape::update_landscape] Physics world did not know collider {}",
                handle
            );
        }
    }

    landscape.boxes = greedy_merge_boxes(landscape.extent, &landscape.filled);
    for merged in &landscape.boxes {
        let aabb = merge_box_aabb(landscape, merged);
        landscape.colliders.push(physics.add_box(&aabb));
    }

    log::info!(
        "[landscape::update_landscape] Rebuilt landscape: {} filled cells, {} boxes ({} colliders removed)",
        landscape.filled.iter().filter(|bit| *bit).count(),
        landscape.boxes.len(),
        stale
    );
    landscape.boxes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::ColliderSet;

    fn landscape(extent: [u32; 3], cells: &[[u32; 3]]) -> VoxelLandscape {
        let mut landscape = create_voxel_landscape(Point3::new(0.0, 0.0, 0.0), extent, 0.5);
        for cell in cells {
            set_filled(&mut landscape, *cell, true).expect("cell inside");
        }
        landscape
    }

    #[test]
    fn test_full_2x2x1_is_one_box() {
        let mut land = landscape([2, 2, 1], &[[0, 0, 0], [1, 0, 0], [0, 1, 0], [1, 1, 0]]);
        let mut physics = ColliderSet::new();

        assert_eq!(update_landscape(&mut land, &mut physics), 1);
        assert_eq!(
            land.boxes[0],
            MergeBox {
                min: [0, 0, 0],
                size: [2, 2, 1]
            }
        );

        let aabb = physics.colliders.values().next().expect("one collider");
        assert_eq!(aabb.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 1.0, 0.5));
    }

    #[test]
    fn test_full_block_merges_along_all_axes() {
        let mut cells = Vec::new();
        for x in 0..3 {
            for y in 0..2 {
                for z in 0..4 {
                    cells.push([x, y, z]);
                }
            }
        }
        let land = landscape([3, 2, 4], &cells);
        let boxes = greedy_merge_boxes(land.extent, &land.filled);
        assert_eq!(
            boxes,
            vec![MergeBox {
                min: [0, 0, 0],
                size: [3, 2, 4]
            }]
        );
    }

    #[test]
    fn test_l_shape_grows_x_first() {
        let land = landscape([2, 2, 1], &[[0, 0, 0], [1, 0, 0], [0, 1, 0]]);
        let boxes = greedy_merge_boxes(land.extent, &land.filled);
        assert_eq!(
            boxes,
            vec![
                MergeBox {
                    min: [0, 0, 0],
                    size: [2, 1, 1]
                },
                MergeBox {
                    min: [0, 1, 0],
                    size: [1, 1, 1]
                },
            ]
        );
    }

    #[test]
    fn test_disjoint_cells_get_separate_boxes() {
        let land = landscape([3, 1, 1], &[[0, 0, 0], [2, 0, 0]]);
        assert_eq!(greedy_merge_boxes(land.extent, &land.filled).len(), 2);
    }

    #[test]
    fn test_rebuild_replaces_previous_colliders() {
        let mut land = landscape([3, 1, 1], &[[0, 0, 0], [2, 0, 0]]);
        let mut physics = ColliderSet::new();

        update_landscape(&mut land, &mut physics);
        let first: Vec<ColliderHandle> = land.colliders.clone();
        assert_eq!(physics.len(), 2);

        set_filled(&mut land, [1, 0, 0], true).expect("cell inside");
        update_landscape(&mut land, &mut physics);

        assert_eq!(physics.len(), 1);
        assert!(first.iter().all(|handle| !physics.colliders.contains_key(handle)));
        assert_eq!(land.boxes[0].size, [3, 1, 1]);
    }

    #[test]
    fn test_set_filled_outside_extent_fails() {
        let mut land = landscape([2, 2, 2], &[]);
        assert!(set_filled(&mut land, [2, 0, 0], true).is_err());
        assert!(!is_filled(&land, [2, 0, 0]));
    }

    #[test]
    fn test_fill_from_grid_copies_active_flags() {
        use crate::config::VoxelConfig;
        use crate::voxel::voxel_grid_operations::{create_voxel_grid, observe_voxel};
        use crate::voxel::VoxelCoord;

        let config = VoxelConfig {
            extent: [2, 1, 1],
            ..VoxelConfig::default()
        };
        let mut grid = create_voxel_grid(&config).expect("grid");
        for _ in 0..5 {
            observe_voxel(&mut grid, VoxelCoord { x: 1, y: 0, z: 0 }, 1.0, 0.5).expect("inside");
        }

        let mut land = create_landscape_for_grid(&grid);
        fill_from_grid(&mut land, &grid).expect("same extent");
        assert!(!is_filled(&land, [0, 0, 0]));
        assert!(is_filled(&land, [1, 0, 0]));
    }
}
