//! Per-frame input from the host XR platform - pure data
//!
//! The host fills one `XrFrameInput` per animation frame. Every field is
//! optional in the sense that a platform may report nothing for it; absence
//! means "no update this frame".

use crate::depth::{create_depth_frame, DepthFrame};
use crate::error::EngineResult;
use cgmath::{Matrix4, Vector3};

/// Position and orientation as a rigid transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub transform: Matrix4<f32>,
}

impl Pose {
    pub fn position(&self) -> Vector3<f32> {
        self.transform.w.truncate()
    }
}

/// Opaque handle of a view (eye or camera) within the viewer pose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u32);

/// Depth information reported for one view
#[derive(Debug, Clone)]
pub struct ViewDepth {
    pub view: ViewId,
    pub width: u32,
    pub height: u32,
    pub raw_buffer: Vec<u8>,
    pub norm_uv_transform: Matrix4<f32>,
    pub raw_value_to_meters: f32,
}

/// Hit-test source issued by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HitTestSource(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTestResult {
    pub pose: Pose,
}

/// Light probe issued by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightProbe(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightEstimate {
    /// Unit vector towards the dominant light
    pub primary_light_direction: Vector3<f32>,
    /// Linear RGB intensity of the dominant light
    pub primary_light_intensity: Vector3<f32>,
    /// Order-2 spherical harmonics, 9 RGB coefficients
    pub spherical_harmonics: [[f32; 3]; 9],
}

/// Opaque handle of a platform plane; stable while the plane is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedPlane {
    pub handle: PlaneHandle,
    /// Boundary in plane space, y = 0
    pub polygon: Vec<[f32; 3]>,
    pub last_changed_time: f64,
    /// Plane space relative to the reference space, when resolvable this frame
    pub pose: Option<Matrix4<f32>>,
}

#[derive(Debug, Clone, Default)]
pub struct XrFrameInput {
    /// Host timestamp in milliseconds
    pub time: f64,
    pub viewer_pose: Option<Pose>,
    pub depth: Vec<ViewDepth>,
    pub hit_test_results: Vec<(HitTestSource, Vec<HitTestResult>)>,
    pub light_estimates: Vec<(LightProbe, LightEstimate)>,
    /// None when the platform reported no plane set this frame
    pub detected_planes: Option<Vec<DetectedPlane>>,
}

impl XrFrameInput {
    /// Depth frame for a view, or None when the platform has none this frame
    pub fn depth_for_view(&self, view: ViewId) -> EngineResult<Option<DepthFrame<'_>>> {
        let Some(depth) = self.depth.iter().find(|d| d.view == view) else {
            return Ok(None);
        };
        create_depth_frame(
            depth.width,
            depth.height,
            &depth.raw_buffer,
            depth.norm_uv_transform,
            depth.raw_value_to_meters,
        )
        .map(Some)
    }

    pub fn hit_test_results_for(&self, source: HitTestSource) -> &[HitTestResult] {
        self.hit_test_results
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, results)| results.as_slice())
            .unwrap_or(&[])
    }

    pub fn light_estimate_for(&self, probe: LightProbe) -> Option<&LightEstimate> {
        self.light_estimates
            .iter()
            .find(|(p, _)| *p == probe)
            .map(|(_, estimate)| estimate)
    }
}

/// Asynchronous requests the core makes of the host platform.
///
/// Implementations hold on to the resolver and complete it whenever the
/// platform answers, possibly several frames later.
pub trait XrPlatform {
    fn request_hit_test_source(&mut self, reply: super::session::RequestResolver<HitTestSource>);
    fn request_light_probe(&mut self, reply: super::session::RequestResolver<LightProbe>);
}
