//! Frame driver
//!
//! Owns every piece of per-session AR state and advances it once per host
//! animation frame. Within a frame the order is fixed: depth is decoded and
//! written into the texture and material uniforms before any tracking state
//! changes, so the frame renders with this frame's depth.

use crate::config::{ArConfig, XrFeature};
use crate::depth::{
    create_depth_canvas_texture, create_depth_data_texture, update_depth_canvas_texture,
    update_depth_data_texture, upload_depth_data_texture, DepthCanvasTextureData,
    DepthDataTextureData,
};
use crate::error::{EngineError, EngineResult};
use crate::scene::{attach_node, create_scene_graph, set_node_visible, SceneGraph};
use crate::shader::{
    transform_material, update_uniforms, upload_material_uniforms, AugmentedMaterialRegistry,
    ComposedProgram, MaterialHandle, ScreenInfo, ShaderProgram,
};
use crate::tracking::{
    clear_planes, create_hit_test_state, create_light_estimation_state, create_plane_tracker,
    end_session, is_feature_enabled, reset_hit_test, reset_light_estimation, update_hit_test,
    update_light_estimation, update_planes, HitTestState, LightEstimationState, PlaneEvent,
    PlaneTrackerState, ViewId, XrFrameInput, XrPlatform, XrSession,
};
use crate::voxel::{
    create_voxel_grid, integrate_depth_frame, CameraPose, DepthIntegrationStats, VoxelGridData,
};
use cgmath::{Matrix4, SquareMatrix};
use wgpu::{Device, Queue};

/// All AR state driven by `update_frame`
pub struct ArContext {
    pub config: ArConfig,
    /// View whose depth feeds the textures and the voxel grid
    pub primary_view: ViewId,
    pub depth_texture: DepthDataTextureData,
    /// Present when `depth_debug.enabled`
    pub depth_canvas: Option<DepthCanvasTextureData>,
    pub materials: AugmentedMaterialRegistry,
    pub scene: SceneGraph,
    pub hit_test: HitTestState,
    pub lighting: LightEstimationState,
    pub planes: PlaneTrackerState,
    /// Present when `voxel.integrate_depth`
    pub voxels: Option<VoxelGridData>,
    pub frames_processed: u64,
}

/// What one call to `update_frame` changed
#[derive(Debug, Default)]
pub struct FrameReport {
    pub depth_updated: bool,
    pub materials_updated: usize,
    pub cursor_visible: bool,
    /// Set on the frame a hit-test source rejection arrived
    pub hit_test_error: Option<EngineError>,
    pub plane_events: Vec<PlaneEvent>,
    pub voxel_stats: Option<DepthIntegrationStats>,
}

pub fn create_ar_context(config: ArConfig) -> EngineResult<ArContext> {
    config.validate()?;

    let mut scene = create_scene_graph();
    let cursor = attach_node(&mut scene, Matrix4::identity(), None, None);
    set_node_visible(&mut scene, cursor, false);

    let depth_canvas = config
        .depth_debug
        .enabled
        .then(|| create_depth_canvas_texture(config.depth_debug.near, config.depth_debug.far));
    let voxels = if config.voxel.integrate_depth {
        Some(create_voxel_grid(&config.voxel)?)
    } else {
        None
    };

    log::info!(
        "[frame::create_ar_context] AR context ready (debug canvas: {}, voxel integration: {})",
        depth_canvas.is_some(),
        voxels.is_some()
    );

    Ok(ArContext {
        primary_view: ViewId(0),
        depth_texture: create_depth_data_texture(),
        depth_canvas,
        materials: AugmentedMaterialRegistry::new(),
        scene,
        hit_test: create_hit_test_state(cursor),
        lighting: create_light_estimation_state(config.lighting.direction_scale),
        planes: create_plane_tracker(),
        voxels,
        frames_processed: 0,
        config,
    })
}

/// Inject depth occlusion into a program, bound to this context's depth texture
pub fn augment_material(
    ctx: &mut ArContext,
    program: &ShaderProgram,
) -> EngineResult<(ComposedProgram, MaterialHandle)> {
    transform_material(
        &mut ctx.materials,
        program,
        ctx.depth_texture.id,
        &ctx.config.occlusion,
    )
}

/// Advance all AR state by one host frame.
///
/// Order: depth decode, data texture, debug canvas, material uniforms,
/// hit-test, light estimation, planes, voxel integration. A hit-test failure
/// lands in `FrameReport::hit_test_error` and the later steps still run.
/// Planes are reconciled whenever the feature is enabled or the platform reports a
/// plane set; the latter without the feature is `FeatureDisabled`.
pub fn update_frame(
    ctx: &mut ArContext,
    session: &mut XrSession,
    platform: &mut dyn XrPlatform,
    frame: &XrFrameInput,
    screen: &ScreenInfo,
    camera: Option<&CameraPose>,
) -> EngineResult<FrameReport> {
    if session.token.is_none() {
        return Err(EngineError::SessionNotActive);
    }
    session.frame_count += 1;
    ctx.frames_processed += 1;

    let mut report = FrameReport::default();

    let depth = if is_feature_enabled(session, XrFeature::DepthSensing) {
        frame.depth_for_view(ctx.primary_view)?
    } else {
        None
    };

    if let Some(depth) = depth.as_ref() {
        report.depth_updated = update_depth_data_texture(&mut ctx.depth_texture, depth);
        if let (true, Some(canvas)) = (report.depth_updated, ctx.depth_canvas.as_mut()) {
            let (near, far) = (ctx.config.depth_debug.near, ctx.config.depth_debug.far);
            update_depth_canvas_texture(canvas, depth, near, far)?;
        }
    }
    report.materials_updated = update_uniforms(&mut ctx.materials, screen, depth.as_ref());

    // A rejected source must not hold back the rest of the frame
    let hit_test = update_hit_test(&mut ctx.hit_test, session, platform, frame, &mut ctx.scene);
    if let Err(error) = hit_test {
        log::warn!("[frame::update_frame] Hit-test unavailable: {}", error);
        report.hit_test_error = Some(error);
    }
    report.cursor_visible = ctx.hit_test.cursor_visible;

    update_light_estimation(&mut ctx.lighting, session, platform, frame);

    if frame.detected_planes.is_some() || is_feature_enabled(session, XrFeature::PlaneDetection) {
        report.plane_events = update_planes(&mut ctx.planes, session, frame, &mut ctx.scene)?;
    }

    if let (Some(grid), Some(depth), Some(camera)) = (ctx.voxels.as_mut(), depth.as_ref(), camera) {
        report.voxel_stats = Some(integrate_depth_frame(grid, depth, camera)?);
    }

    log::trace!(
        "[frame::update_frame] Frame {} done (depth: {}, {} plane events)",
        session.frame_count,
        report.depth_updated,
        report.plane_events.len()
    );
    Ok(report)
}

/// Push this frame's depth texture and material uniforms to the GPU
pub fn upload_frame_resources(ctx: &mut ArContext, device: &Device, queue: &Queue) {
    upload_depth_data_texture(&mut ctx.depth_texture, device, queue);
    upload_material_uniforms(&mut ctx.materials, device, queue);
}

/// End the session and drop every per-session resource: the hit-test source,
/// the light probe and all tracked planes
pub fn end_ar_session(ctx: &mut ArContext, session: &mut XrSession) -> Vec<PlaneEvent> {
    end_session(session);
    reset_hit_test(&mut ctx.hit_test);
    set_node_visible(&mut ctx.scene, ctx.hit_test.cursor, false);
    reset_light_estimation(&mut ctx.lighting);
    clear_planes(&mut ctx.planes, &mut ctx.scene)
}
