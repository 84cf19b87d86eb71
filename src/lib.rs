// Hearth AR - Data-Oriented Programming (DOP) Architecture
//
// Depth-aware occlusion and real-world tracking for AR hosts.
// - *_data modules hold plain data, *_operations modules hold the functions
// - Session, registry and scene are explicit values passed by reference
// - frame::update_frame drives everything once per host animation frame

// Core modules
pub mod config;
pub mod error;

// Depth ingestion and occlusion
pub mod depth;
pub mod shader;

// Real-world state
pub mod physics;
pub mod scene;
pub mod tracking;
pub mod voxel;

// Per-frame driver
pub mod frame;

pub use config::{ArConfig, XrFeature};
pub use depth::{get_depth_in_meters, DepthFrame};
pub use error::{EngineError, EngineResult, ErrorContext, OptionExt};
pub use frame::{
    augment_material, create_ar_context, end_ar_session, update_frame, upload_frame_resources,
    ArContext, FrameReport,
};
pub use physics::{ColliderSet, PhysicsWorld, AABB};
pub use scene::{MeshData, NodeId, SceneGraph};
pub use shader::{ComposedProgram, MaterialHandle, ScreenInfo, ShaderProgram, ShadingModel};
pub use tracking::{
    create_session, end_session, start_session, PlatformCapabilities, XrFrameInput, XrPlatform,
    XrSession,
};
pub use voxel::{CameraPose, VoxelGridData, VoxelLandscape};

// Re-export wgpu for hosts that upload the depth texture and uniforms themselves
pub use wgpu;

/// Install `env_logger` as the `log` backend, configured from `RUST_LOG`.
///
/// Fails if a logger is already installed; callers that may run twice (tests)
/// can ignore the error.
pub fn init_logging() -> EngineResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .context("installing logger")?;
    log::info!("[init_logging] Hearth AR v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
