//! AR configuration
//!
//! Loaded from TOML. Every section has defaults so a partial file (or none at
//! all) produces a usable configuration.

use crate::error::{EngineError, EngineResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Platform features that can be requested for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XrFeature {
    HitTest,
    LightEstimation,
    DepthSensing,
    PlaneDetection,
    ImageTracking,
}

impl XrFeature {
    pub fn name(&self) -> &'static str {
        match self {
            XrFeature::HitTest => "hit-test",
            XrFeature::LightEstimation => "light-estimation",
            XrFeature::DepthSensing => "depth-sensing",
            XrFeature::PlaneDetection => "plane-detection",
            XrFeature::ImageTracking => "image-tracking",
        }
    }
}

/// Preferred depth usage passed to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthUsage {
    CpuOptimized,
    GpuOptimized,
}

/// Preferred depth data format passed to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthFormat {
    /// Two bytes per pixel, low byte first
    LuminanceAlpha,
    Float32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub required_features: Vec<XrFeature>,
    pub optional_features: Vec<XrFeature>,
    pub depth_usage: DepthUsage,
    pub depth_format: DepthFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            required_features: vec![XrFeature::HitTest],
            optional_features: vec![
                XrFeature::LightEstimation,
                XrFeature::DepthSensing,
                XrFeature::PlaneDetection,
            ],
            depth_usage: DepthUsage::CpuOptimized,
            depth_format: DepthFormat::LuminanceAlpha,
        }
    }
}

/// Bindings and locations used by the occlusion injection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    pub enabled: bool,
    pub uniform_group: u32,
    pub uniform_binding: u32,
    pub depth_texture_binding: u32,
    pub depth_sampler_binding: u32,
    pub v_depth_location: u32,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uniform_group: 3,
            uniform_binding: 0,
            depth_texture_binding: 1,
            depth_sampler_binding: 2,
            v_depth_location: 15,
        }
    }
}

/// Range mapped onto the debug canvas gradient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthDebugConfig {
    /// Render the debug canvas every frame
    pub enabled: bool,
    pub near: f32,
    pub far: f32,
}

impl Default for DepthDebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            near: 0.1,
            far: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelConfig {
    /// World position of the grid's minimum corner (meters)
    pub origin: [f32; 3],
    /// Cells per axis
    pub extent: [u32; 3],
    /// Edge length of one cell (meters)
    pub voxel_size: f32,
    pub threshold: f32,
    pub default_factor: f32,
    /// Run depth integration every frame
    pub integrate_depth: bool,
}

impl Default for VoxelConfig {
    fn default() -> Self {
        Self {
            origin: [-2.0, -2.0, -2.0],
            extent: [20, 20, 20],
            voxel_size: 0.2,
            threshold: 0.6,
            default_factor: 0.3,
            integrate_depth: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Distance at which the directional light is placed along the estimated direction
    pub direction_scale: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            direction_scale: crate::tracking::light_estimation::LIGHT_DIRECTION_SCALE,
        }
    }
}

/// Top-level AR configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArConfig {
    pub session: SessionConfig,
    pub occlusion: OcclusionConfig,
    pub depth_debug: DepthDebugConfig,
    pub voxel: VoxelConfig,
    pub lighting: LightingConfig,
}

impl ArConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: ArConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading AR config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("parsing AR config {}", path.display()))?;
        log::info!("[ArConfig::load] Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> EngineResult<()> {
        let depth = &self.depth_debug;
        if !(depth.near >= 0.0 && depth.near < depth.far) {
            return Err(invalid(
                "depth_debug.near",
                format!("{}..{}", depth.near, depth.far),
                "near must be non-negative and less than far",
            ));
        }

        let voxel = &self.voxel;
        if voxel.extent.iter().any(|&e| e == 0) {
            return Err(invalid(
                "voxel.extent",
                format!("{:?}", voxel.extent),
                "every axis needs at least one cell",
            ));
        }
        if !(voxel.voxel_size > 0.0) {
            return Err(invalid(
                "voxel.voxel_size",
                voxel.voxel_size.to_string(),
                "must be positive",
            ));
        }
        if !(voxel.threshold > 0.0 && voxel.threshold < 1.0) {
            return Err(invalid(
                "voxel.threshold",
                voxel.threshold.to_string(),
                "must lie strictly between 0 and 1",
            ));
        }
        if !(voxel.default_factor > 0.0 && voxel.default_factor <= 1.0) {
            return Err(invalid(
                "voxel.default_factor",
                voxel.default_factor.to_string(),
                "must lie in (0, 1]",
            ));
        }

        let occlusion = &self.occlusion;
        let bindings = [
            occlusion.uniform_binding,
            occlusion.depth_texture_binding,
            occlusion.depth_sampler_binding,
        ];
        if bindings[0] == bindings[1] || bindings[0] == bindings[2] || bindings[1] == bindings[2] {
            return Err(invalid(
                "occlusion.bindings",
                format!("{:?}", bindings),
                "uniform, texture and sampler bindings must differ",
            ));
        }

        if self
            .session
            .required_features
            .iter()
            .any(|f| self.session.optional_features.contains(f))
        {
            return Err(invalid(
                "session.optional_features",
                format!("{:?}", self.session.optional_features),
                "a feature cannot be both required and optional",
            ));
        }

        // Depth ingestion only decodes the packed two-byte layout
        if self.session.depth_format != DepthFormat::LuminanceAlpha {
            return Err(invalid(
                "session.depth_format",
                format!("{:?}", self.session.depth_format),
                "only luminance_alpha depth data is supported",
            ));
        }

        log::debug!("[ArConfig::validate] Configuration validated successfully");
        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> EngineError {
    EngineError::InvalidConfig {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    }
}
