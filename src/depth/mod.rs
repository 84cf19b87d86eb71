/// Depth Module - Data-Oriented Programming (DOP) style
///
/// - depth_frame_data.rs / depth_texture_data.rs: pure data, no methods
/// - depth_frame_operations.rs / depth_texture_operations.rs: functions over that data
///
/// A depth frame is borrowed from the host for the duration of one call and
/// never retained; the textures copy what they need out of it.

pub mod depth_frame_data;
pub mod depth_frame_operations;
pub mod depth_texture_data;
pub mod depth_texture_operations;

pub use depth_frame_data::DepthFrame;
pub use depth_texture_data::{
    DepthCanvasTextureData, DepthDataTextureData, DepthTextureId, GpuDepthTexture,
};

pub use depth_frame_operations::{
    create_depth_frame, get_depth_in_meters, pack_depth_value, raw_depth_at,
    unpack_depth_channels, BYTES_PER_DEPTH_PIXEL,
};
pub use depth_texture_operations::{
    create_depth_canvas_texture, create_depth_data_texture, decode_texel_in_meters,
    normalized_depth_color, update_depth_canvas_texture, update_depth_data_texture,
    upload_depth_data_texture,
};
