//! Depth frame data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in depth_frame_operations.rs

use cgmath::Matrix4;

/// One view's environment depth for the current frame.
///
/// The raw buffer is borrowed from the host; the lifetime keeps a frame from
/// outliving the callback that produced it.
#[derive(Debug, Clone, Copy)]
pub struct DepthFrame<'a> {
    /// Depth buffer width in pixels
    pub width: u32,

    /// Depth buffer height in pixels
    pub height: u32,

    /// Packed depth, two bytes per pixel, low byte first
    pub raw_buffer: &'a [u8],

    /// Maps normalized view coordinates to normalized depth buffer coordinates
    pub norm_uv_transform: Matrix4<f32>,

    /// Multiplier turning a raw 16-bit value into meters
    pub raw_value_to_meters: f32,
}
