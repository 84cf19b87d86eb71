//! Depth Texture Operations - Pure DOP Functions
//!
//! The data texture is refreshed at most once per frame, after the frame's
//! depth is available and before the scene is rendered. Skipping a frame
//! leaves the previous depth in place.

use super::depth_frame_data::DepthFrame;
use super::depth_frame_operations::{get_depth_in_meters, unpack_depth_channels, BYTES_PER_DEPTH_PIXEL};
use super::depth_texture_data::{
    DepthCanvasTextureData, DepthDataTextureData, DepthTextureId, GpuDepthTexture,
};
use crate::error::EngineResult;
use image::RgbaImage;
use std::sync::atomic::{AtomicU32, Ordering};
use wgpu::{Device, Queue};

static NEXT_DEPTH_TEXTURE_ID: AtomicU32 = AtomicU32::new(1);

// ============================================================================
// DATA TEXTURE
// ============================================================================

/// Create an empty depth data texture; it takes its size from the first frame
pub fn create_depth_data_texture() -> DepthDataTextureData {
    DepthDataTextureData {
        id: DepthTextureId(NEXT_DEPTH_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)),
        width: 0,
        height: 0,
        bytes: Vec::new(),
        raw_value_to_meters: 0.0,
        dirty: false,
        resized: false,
        frames_received: 0,
        gpu: None,
    }
}

/// Copy the frame's packed depth into the texture and mark it for upload.
///
/// A frame whose buffer is shorter than its dimensions is skipped and the
/// previous depth stays in place. Returns whether the texture was updated.
pub fn update_depth_data_texture(texture: &mut DepthDataTextureData, frame: &DepthFrame) -> bool {
    let byte_len = frame.width as usize * frame.height as usize * BYTES_PER_DEPTH_PIXEL;
    let Some(source) = frame.raw_buffer.get(..byte_len) else {
        log::warn!(
            "[depth_texture_operations::update_depth_data_texture] Skipping {}x{} frame with {} of {} bytes",
            frame.width,
            frame.height,
            frame.raw_buffer.len(),
            byte_len
        );
        return false;
    };

    if texture.width != frame.width || texture.height != frame.height {
        log::info!(
            "[depth_texture_operations::update_depth_data_texture] Resizing depth texture {}x{} -> {}x{}",
            texture.width,
            texture.height,
            frame.width,
            frame.height
        );
        texture.width = frame.width;
        texture.height = frame.height;
        texture.bytes.resize(byte_len, 0);
        texture.resized = true;
    }

    texture.bytes.copy_from_slice(source);
    texture.raw_value_to_meters = frame.raw_value_to_meters;
    texture.dirty = true;
    texture.frames_received += 1;
    true
}

/// Decode one texel the way a shader consumer does: (c0 + c1 * 256) * scale
pub fn decode_texel_in_meters(texture: &DepthDataTextureData, x: u32, y: u32) -> Option<f32> {
    if x >= texture.width || y >= texture.height {
        return None;
    }
    let index = (y as usize * texture.width as usize + x as usize) * BYTES_PER_DEPTH_PIXEL;
    let texel = texture.bytes.get(index..index + BYTES_PER_DEPTH_PIXEL)?;
    Some(unpack_depth_channels(texel[0], texel[1]) as f32 * texture.raw_value_to_meters)
}

/// Push pending depth bytes to the GPU, recreating the texture after a resize
pub fn upload_depth_data_texture(texture: &mut DepthDataTextureData, device: &Device, queue: &Queue) {
    if !texture.dirty || texture.width == 0 || texture.height == 0 {
        return;
    }

    if texture.resized || texture.gpu.is_none() {
        texture.gpu = Some(create_gpu_depth_texture(device, texture.width, texture.height));
        texture.resized = false;
    }

    let Some(gpu) = texture.gpu.as_ref() else {
        return;
    };

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &gpu.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &texture.bytes,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(BYTES_PER_DEPTH_PIXEL as u32 * texture.width),
            rows_per_image: Some(texture.height),
        },
        wgpu::Extent3d {
            width: texture.width,
            height: texture.height,
            depth_or_array_layers: 1,
        },
    );

    texture.dirty = false;
}

fn create_gpu_depth_texture(device: &Device, width: u32, height: u32) -> GpuDepthTexture {
    let max_dimension = device.limits().max_texture_dimension_2d;
    if width > max_dimension || height > max_dimension {
        log::warn!(
            "[depth_texture_operations::create_gpu_depth_texture] Depth texture {}x{} exceeds GPU limit {}",
            width,
            height,
            max_dimension
        );
    }

    log::info!(
        "[depth_texture_operations::create_gpu_depth_texture] Creating {}x{} depth texture",
        width,
        height
    );

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Data Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rg8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Packed channels must not be blended between texels
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Depth Data Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    GpuDepthTexture {
        texture,
        view,
        sampler,
        width,
        height,
    }
}

// ============================================================================
// DEBUG CANVAS
// ============================================================================

pub fn create_depth_canvas_texture(near: f32, far: f32) -> DepthCanvasTextureData {
    DepthCanvasTextureData {
        image: RgbaImage::new(1, 1),
        near,
        far,
        dirty: false,
    }
}

/// Gray level for a depth: round(clamp((d - near) / (far - near), 0, 1) * 256),
/// saturated to the 8-bit channel
pub fn normalized_depth_color(depth: f32, near: f32, far: f32) -> u8 {
    let normalized = ((depth - near) / (far - near)).clamp(0.0, 1.0);
    (normalized * 256.0).round().min(255.0) as u8
}

/// Render the frame's depth into the canvas. O(width * height), debug only.
pub fn update_depth_canvas_texture(
    canvas: &mut DepthCanvasTextureData,
    frame: &DepthFrame,
    near: f32,
    far: f32,
) -> EngineResult<()> {
    // Canvas is transposed relative to the sensor grid
    let canvas_width = frame.height;
    let canvas_height = frame.width;

    if canvas.image.width() != canvas_width || canvas.image.height() != canvas_height {
        canvas.image = RgbaImage::new(canvas_width, canvas_height);
    } else {
        canvas.image.fill(0);
    }
    canvas.near = near;
    canvas.far = far;

    let pixels: &mut [u8] = &mut canvas.image;
    let stride = canvas_width as usize;

    for x in 0..frame.width {
        for y in 0..frame.height {
            let depth = get_depth_in_meters(frame, x, y)?;
            let value = normalized_depth_color(depth, near, far);

            let j = (x as usize * stride + (stride - y as usize)) * 4;
            // The y == 0 column of the last row lands one pixel past the end
            if let Some(texel) = pixels.get_mut(j..j + 4) {
                texel.copy_from_slice(&[value, value, value, 255]);
            }
        }
    }

    canvas.dirty = true;
    log::trace!(
        "[depth_texture_operations::update_depth_canvas_texture] Rendered {}x{} depth canvas",
        canvas_width,
        canvas_height
    );
    Ok(())
}
