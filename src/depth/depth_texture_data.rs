//! Depth texture data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in depth_texture_operations.rs

use image::RgbaImage;
use wgpu::{Sampler, Texture, TextureView};

/// Identifies the shared depth texture that augmented materials sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthTextureId(pub u32);

/// GPU-side resources backing a depth data texture
pub struct GpuDepthTexture {
    pub texture: Texture,
    pub view: TextureView,
    pub sampler: Sampler,
    pub width: u32,
    pub height: u32,
}

/// Packed depth texture: two 8-bit channels per pixel holding one 16-bit distance
pub struct DepthDataTextureData {
    pub id: DepthTextureId,

    pub width: u32,
    pub height: u32,

    /// width * height * 2 bytes, same layout as the host's raw depth buffer
    pub bytes: Vec<u8>,

    /// Scale of the frame the bytes came from
    pub raw_value_to_meters: f32,

    /// Bytes changed since the last GPU upload
    pub dirty: bool,

    /// Dimensions changed; the GPU texture must be recreated
    pub resized: bool,

    /// Number of frames copied in so far
    pub frames_received: u64,

    pub gpu: Option<GpuDepthTexture>,
}

/// Debug visualization of the depth field, grayscale in RGB with full alpha.
///
/// The canvas is transposed relative to the depth frame: its width is the
/// frame height and its height is the frame width.
#[derive(Debug, Clone)]
pub struct DepthCanvasTextureData {
    pub image: RgbaImage,
    pub near: f32,
    pub far: f32,
    pub dirty: bool,
}
