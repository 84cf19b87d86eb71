//! Depth frame operations - Pure DOP functions
//!
//! Raw per-pixel lookups only. No interpolation or smoothing happens here.

use super::depth_frame_data::DepthFrame;
use crate::error::{EngineError, EngineResult};
use cgmath::Matrix4;

/// Bytes used by one packed depth sample
pub const BYTES_PER_DEPTH_PIXEL: usize = 2;

/// Build a depth frame from host data, checking the buffer covers the grid
pub fn create_depth_frame<'a>(
    width: u32,
    height: u32,
    raw_buffer: &'a [u8],
    norm_uv_transform: Matrix4<f32>,
    raw_value_to_meters: f32,
) -> EngineResult<DepthFrame<'a>> {
    let required = width as usize * height as usize * BYTES_PER_DEPTH_PIXEL;
    if raw_buffer.len() < required {
        return Err(EngineError::CorruptedData {
            reason: format!(
                "depth buffer holds {} bytes, {}x{} frame needs {}",
                raw_buffer.len(),
                width,
                height,
                required
            ),
        });
    }

    if !raw_value_to_meters.is_finite() || raw_value_to_meters < 0.0 {
        return Err(EngineError::CorruptedData {
            reason: format!("invalid raw value scale {}", raw_value_to_meters),
        });
    }

    Ok(DepthFrame {
        width,
        height,
        raw_buffer,
        norm_uv_transform,
        raw_value_to_meters,
    })
}

/// Raw 16-bit depth value at pixel (x, y)
pub fn raw_depth_at(frame: &DepthFrame, x: u32, y: u32) -> EngineResult<u16> {
    if x >= frame.width || y >= frame.height {
        let size = frame.width as usize * frame.height as usize;
        return Err(EngineError::BufferAccess {
            index: y as usize * frame.width as usize + x as usize,
            size,
        });
    }

    let index = (y as usize * frame.width as usize + x as usize) * BYTES_PER_DEPTH_PIXEL;
    match frame.raw_buffer.get(index..index + BYTES_PER_DEPTH_PIXEL) {
        Some(bytes) => Ok(unpack_depth_channels(bytes[0], bytes[1])),
        None => Err(EngineError::BufferAccess {
            index,
            size: frame.raw_buffer.len(),
        }),
    }
}

/// Distance in meters from the viewer to the real surface seen at pixel (x, y)
pub fn get_depth_in_meters(frame: &DepthFrame, x: u32, y: u32) -> EngineResult<f32> {
    let raw = raw_depth_at(frame, x, y)?;
    Ok(raw as f32 * frame.raw_value_to_meters)
}

/// Split a 16-bit distance into (low, high) texture channels
pub fn pack_depth_value(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Join (low, high) texture channels back into the 16-bit distance
pub fn unpack_depth_channels(low: u8, high: u8) -> u16 {
    low as u16 + high as u16 * 256
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn frame_bytes(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| pack_depth_value(*v)).collect()
    }

    #[test]
    fn test_depth_lookup_is_row_major_little_endian() {
        let bytes = frame_bytes(&[0, 1000, 2000, 3000, 4000, 65535]);
        let frame = create_depth_frame(3, 2, &bytes, Matrix4::identity(), 0.001)
            .expect("frame should be valid");

        assert_eq!(raw_depth_at(&frame, 1, 0).expect("in bounds"), 1000);
        assert_eq!(raw_depth_at(&frame, 0, 1).expect("in bounds"), 3000);

        let meters = get_depth_in_meters(&frame, 2, 0).expect("in bounds");
        assert!((meters - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_depth_is_never_negative() {
        let values: Vec<u16> = (0..64).map(|i| (i * 1021) as u16).collect();
        let bytes = frame_bytes(&values);
        let frame = create_depth_frame(8, 8, &bytes, Matrix4::identity(), 0.001)
            .expect("frame should be valid");

        for y in 0..frame.height {
            for x in 0..frame.width {
                let depth = get_depth_in_meters(&frame, x, y).expect("in bounds");
                assert!(depth >= 0.0);
            }
        }
    }

    #[test]
    fn test_out_of_bounds_lookup_fails() {
        let bytes = frame_bytes(&[1, 2, 3, 4]);
        let frame = create_depth_frame(2, 2, &bytes, Matrix4::identity(), 1.0)
            .expect("frame should be valid");

        assert!(matches!(
            get_depth_in_meters(&frame, 2, 0),
            Err(EngineError::BufferAccess { .. })
        ));
        assert!(get_depth_in_meters(&frame, 0, 2).is_err());
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let bytes = vec![0u8; 7];
        let result = create_depth_frame(2, 2, &bytes, Matrix4::identity(), 1.0);
        assert!(matches!(result, Err(EngineError::CorruptedData { .. })));
    }

    #[test]
    fn test_negative_scale_is_rejected() {
        let bytes = vec![0u8; 8];
        assert!(create_depth_frame(2, 2, &bytes, Matrix4::identity(), -0.001).is_err());
    }

    #[test]
    fn test_pack_unpack_recovers_every_value() {
        for value in 0..=u16::MAX {
            let [low, high] = pack_depth_value(value);
            assert_eq!(unpack_depth_channels(low, high), value);
        }
    }
}
