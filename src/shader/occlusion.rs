//! Depth occlusion for arbitrary materials
//!
//! `transform_material` patches a program so fragments behind the real-world
//! surface are discarded, and registers the material's uniform state. The
//! frame driver then calls `update_uniforms` once per frame, before render,
//! for every registered material. No scene traversal or flag scanning: the
//! registry is the list of augmented materials.

use super::program::{
    compose_program, render_program, ComposedProgram, ProgramPatch, ShaderAnchor, ShaderProgram,
    ShadingModel, StageKind,
};
use crate::config::OcclusionConfig;
use crate::depth::{DepthFrame, DepthTextureId};
use crate::error::{EngineError, EngineResult, OptionExt};
use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;
use wgpu::{Buffer, Device, Queue};

/// Identifies a material produced by `transform_material`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

/// Per-material occlusion state, rewritten every frame
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedMaterialState {
    /// Shared with every other augmented material in the scene
    pub depth_texture: DepthTextureId,

    /// Framebuffer size in device pixels
    pub screen_width: f32,
    pub screen_height: f32,

    pub uv_transform: Matrix4<f32>,
    pub occlusion_enabled: bool,
    pub raw_value_to_meters: f32,
}

/// Uniform buffer data for the injected occlusion block.
/// Must match `OcclusionUniforms` in the injected WGSL exactly.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct OcclusionUniform {
    /// Normalized view UV -> normalized depth UV (4x4, column-major)
    pub uv_transform: [[f32; 4]; 4],

    /// Framebuffer width, height in device pixels
    pub screen_size: [f32; 2],

    pub raw_value_to_meters: f32,

    /// 1 when occlusion is on
    pub occlusion_enabled: u32,
}

struct MaterialEntry {
    name: String,
    state: AugmentedMaterialState,
    uniform_buffer: Option<Buffer>,
}

/// Every material that went through `transform_material`
#[derive(Default)]
pub struct AugmentedMaterialRegistry {
    entries: Vec<MaterialEntry>,
}

impl AugmentedMaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self, handle: MaterialHandle) -> Option<&AugmentedMaterialState> {
        self.entries.get(handle.0 as usize).map(|entry| &entry.state)
    }

    pub fn name(&self, handle: MaterialHandle) -> Option<&str> {
        self.entries.get(handle.0 as usize).map(|entry| entry.name.as_str())
    }

    pub fn handles(&self) -> impl Iterator<Item = MaterialHandle> + '_ {
        (0..self.entries.len() as u32).map(MaterialHandle)
    }
}

/// Current framebuffer size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenInfo {
    /// CSS pixels
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
}

impl ScreenInfo {
    pub fn device_size(&self) -> (f32, f32) {
        (
            self.width as f32 * self.device_pixel_ratio,
            self.height as f32 * self.device_pixel_ratio,
        )
    }
}

// ============================================================================
// INJECTED CODE
// ============================================================================

/// Varying field name carrying the fragment's virtual depth
const V_DEPTH: &str = "v_depth";

fn varyings_code(config: &OcclusionConfig) -> String {
    format!("    @location({}) {}: f32,", config.v_depth_location, V_DEPTH)
}

// Post-projection z of the vertex; programs name their output `out`
fn vertex_code() -> String {
    format!("    out.{} = out.clip_position.z;", V_DEPTH)
}

fn declarations_code(config: &OcclusionConfig) -> String {
    let mut wgsl = String::new();
    wgsl.push_str("struct OcclusionUniforms {\n");
    wgsl.push_str("    uv_transform: mat4x4<f32>,\n");
    wgsl.push_str("    screen_size: vec2<f32>,\n");
    wgsl.push_str("    raw_value_to_meters: f32,\n");
    wgsl.push_str("    occlusion_enabled: u32,\n");
    wgsl.push_str("};\n");
    wgsl.push_str(&format!(
        "@group({}) @binding({}) var<uniform> occlusion: OcclusionUniforms;\n",
        config.uniform_group, config.uniform_binding
    ));
    wgsl.push_str(&format!(
        "@group({}) @binding({}) var occlusion_depth_texture: texture_2d<f32>;\n",
        config.uniform_group, config.depth_texture_binding
    ));
    wgsl.push_str(&format!(
        "@group({}) @binding({}) var occlusion_depth_sampler: sampler;\n",
        config.uniform_group, config.depth_sampler_binding
    ));
    wgsl
}

// Fragment input is named `in`. The y flip maps top-left framebuffer origin
// onto the bottom-left view UV the platform transform expects.
fn fragment_code() -> String {
    format!(
        "    {{
        let occlusion_screen_uv = in.clip_position.xy / occlusion.screen_size;
        let occlusion_depth_uv = (occlusion.uv_transform * vec4<f32>(occlusion_screen_uv.x, 1.0 - occlusion_screen_uv.y, 0.0, 1.0)).xy;
        let occlusion_packed = textureSampleLevel(occlusion_depth_texture, occlusion_depth_sampler, occlusion_depth_uv, 0.0).rg;
        let occlusion_real_depth = dot(occlusion_packed, vec2<f32>(255.0, 256.0 * 255.0)) * occlusion.raw_value_to_meters;
        if (occlusion.occlusion_enabled != 0u && occlusion_real_depth < in.{}) {{
            discard;
        }}
    }}",
        V_DEPTH
    )
}

/// Fragment anchor for the depth test; shadow-only programs have no clipping chunk
pub fn fragment_anchor(model: ShadingModel) -> ShaderAnchor {
    match model {
        ShadingModel::ShadowOnly => ShaderAnchor::FogFragment,
        ShadingModel::Unlit | ShadingModel::Lit => ShaderAnchor::ClippingPlanesFragment,
    }
}

/// Insertions that add depth occlusion to a program of the given shading model
pub fn occlusion_patch(config: &OcclusionConfig, model: ShadingModel) -> ProgramPatch {
    ProgramPatch::new()
        .insert(StageKind::Vertex, ShaderAnchor::Varyings, varyings_code(config))
        .insert(StageKind::Vertex, ShaderAnchor::FogVertex, vertex_code())
        .insert(StageKind::Fragment, ShaderAnchor::Declarations, declarations_code(config))
        .insert(StageKind::Fragment, fragment_anchor(model), fragment_code())
}

// ============================================================================
// TRANSFORM / UPDATE
// ============================================================================

/// Patch `program` with depth occlusion and register its uniform state.
///
/// Fails if the program lacks any anchor the patch needs.
pub fn transform_material(
    registry: &mut AugmentedMaterialRegistry,
    program: &ShaderProgram,
    depth_texture: DepthTextureId,
    config: &OcclusionConfig,
) -> EngineResult<(ComposedProgram, MaterialHandle)> {
    let patch = occlusion_patch(config, program.shading_model);
    let composed = compose_program(program, &patch)?;

    let handle = MaterialHandle(registry.entries.len() as u32);
    registry.entries.push(MaterialEntry {
        name: program.name.clone(),
        state: AugmentedMaterialState {
            depth_texture,
            screen_width: 1.0,
            screen_height: 1.0,
            uv_transform: Matrix4::identity(),
            occlusion_enabled: config.enabled,
            raw_value_to_meters: 0.0,
        },
        uniform_buffer: None,
    });

    log::debug!(
        "[occlusion::transform_material] Augmented material '{}' as {:?}",
        program.name,
        handle
    );
    Ok((render_program(&composed), handle))
}

/// Refresh screen size and depth mapping on every augmented material.
///
/// Without a depth frame the previous transform and scale are kept.
/// Returns the number of materials written.
pub fn update_uniforms(
    registry: &mut AugmentedMaterialRegistry,
    screen: &ScreenInfo,
    frame: Option<&DepthFrame>,
) -> usize {
    let (screen_width, screen_height) = screen.device_size();

    for entry in &mut registry.entries {
        let state = &mut entry.state;
        state.screen_width = screen_width;
        state.screen_height = screen_height;
        if let Some(frame) = frame {
            state.uv_transform = frame.norm_uv_transform;
            state.raw_value_to_meters = frame.raw_value_to_meters;
        }
    }

    log::trace!(
        "[occlusion::update_uniforms] Updated {} materials ({}x{})",
        registry.entries.len(),
        screen_width,
        screen_height
    );
    registry.entries.len()
}

/// Turn occlusion on or off for one material; the injected code stays in place
pub fn set_occlusion_enabled(
    registry: &mut AugmentedMaterialRegistry,
    handle: MaterialHandle,
    enabled: bool,
) -> EngineResult<()> {
    let entry = registry
        .entries
        .get_mut(handle.0 as usize)
        .ok_or_engine(|| EngineError::ResourceNotFound {
            resource_type: "augmented material".to_string(),
            id: handle.0.to_string(),
        })?;
    entry.state.occlusion_enabled = enabled;
    Ok(())
}

/// Build the GPU uniform for one material's state
pub fn build_occlusion_uniform(state: &AugmentedMaterialState) -> OcclusionUniform {
    OcclusionUniform {
        uv_transform: state.uv_transform.into(),
        screen_size: [state.screen_width, state.screen_height],
        raw_value_to_meters: state.raw_value_to_meters,
        occlusion_enabled: state.occlusion_enabled as u32,
    }
}

/// Write every material's uniform to its GPU buffer, creating buffers on first use
pub fn upload_material_uniforms(
    registry: &mut AugmentedMaterialRegistry,
    device: &Device,
    queue: &Queue,
) {
    for entry in &mut registry.entries {
        let uniform = build_occlusion_uniform(&entry.state);
        match &entry.uniform_buffer {
            Some(buffer) => queue.write_buffer(buffer, 0, bytemuck::bytes_of(&uniform)),
            None => {
                entry.uniform_buffer = Some(device.create_buffer_init(
                    &wgpu::util::BufferInitDescriptor {
                        label: Some("Occlusion Uniform Buffer"),
                        contents: bytemuck::bytes_of(&uniform),
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    },
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::create_depth_frame;

    const LIT_SOURCE: &str = "\
//@stage vertex
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
//@anchor varyings
};
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(position, 1.0);
//@anchor fog_vertex
    return out;
}
//@stage fragment
//@anchor declarations
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
//@anchor clipping_planes_fragment
    var color = vec4<f32>(1.0);
//@anchor fog_fragment
    return color;
}
";

    fn lit_program() -> ShaderProgram {
        ShaderProgram::parse("lit", ShadingModel::Lit, LIT_SOURCE).expect("parse")
    }

    #[test]
    fn test_transform_injects_depth_test_after_clipping_planes() {
        let mut registry = AugmentedMaterialRegistry::new();
        let (composed, handle) = transform_material(
            &mut registry,
            &lit_program(),
            DepthTextureId(7),
            &OcclusionConfig::default(),
        )
        .expect("transform");

        let fragment = &composed.fragment_source;
        let clipping = fragment.find("clipping_planes_fragment").expect("anchor");
        let discard = fragment.find("discard;").expect("depth test");
        let fog = fragment.find("//@anchor fog_fragment").expect("fog anchor");
        assert!(clipping < discard && discard < fog);
        assert!(fragment.contains("var<uniform> occlusion: OcclusionUniforms;"));
        assert!(fragment.contains("@group(3) @binding(1) var occlusion_depth_texture"));

        let vertex = &composed.vertex_source;
        assert!(vertex.contains("@location(15) v_depth: f32,"));
        let fog_vertex = vertex.find("fog_vertex").expect("anchor");
        let assignment = vertex.find("out.v_depth = out.clip_position.z;").expect("v_depth");
        let ret = vertex.find("return out;").expect("return");
        assert!(fog_vertex < assignment && assignment < ret);

        let state = registry.state(handle).expect("registered");
        assert_eq!(state.depth_texture, DepthTextureId(7));
        assert!(state.occlusion_enabled);
    }

    #[test]
    fn test_shadow_only_uses_fog_fragment_anchor() {
        let source = "\
//@stage vertex
struct VertexOutput {
//@anchor varyings
};
fn vs_main() {
//@anchor fog_vertex
}
//@stage fragment
//@anchor declarations
fn fs_main() {
    let shadow = 0.5;
//@anchor fog_fragment
}
";
        let program = ShaderProgram::parse("shadow", ShadingModel::ShadowOnly, source).expect("parse");
        let mut registry = AugmentedMaterialRegistry::new();
        let (composed, _) = transform_material(
            &mut registry,
            &program,
            DepthTextureId(1),
            &OcclusionConfig::default(),
        )
        .expect("shadow-only programs have no clipping chunk");

        let fragment = &composed.fragment_source;
        assert!(fragment.find("let shadow").expect("code") < fragment.find("discard;").expect("test"));
    }

    #[test]
    fn test_transform_fails_without_anchor() {
        let source = "//@stage vertex\n//@anchor varyings\n//@anchor fog_vertex\n//@stage fragment\n//@anchor declarations\n";
        let program = ShaderProgram::parse("broken", ShadingModel::Lit, source).expect("parse");
        let mut registry = AugmentedMaterialRegistry::new();

        let result = transform_material(
            &mut registry,
            &program,
            DepthTextureId(1),
            &OcclusionConfig::default(),
        );
        assert!(matches!(result, Err(EngineError::MissingShaderAnchor { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_uniforms_writes_every_material() {
        let mut registry = AugmentedMaterialRegistry::new();
        let config = OcclusionConfig::default();
        let (_, shared) = transform_material(&mut registry, &lit_program(), DepthTextureId(1), &config)
            .expect("transform");
        let (_, other) = transform_material(&mut registry, &lit_program(), DepthTextureId(1), &config)
            .expect("transform");

        let bytes = vec![0u8; 8];
        let uv = Matrix4::from_nonuniform_scale(-1.0, 1.0, 1.0);
        let frame = create_depth_frame(2, 2, &bytes, uv, 0.001).expect("frame");
        let screen = ScreenInfo {
            width: 400,
            height: 300,
            device_pixel_ratio: 2.0,
        };

        let written = update_uniforms(&mut registry, &screen, Some(&frame));
        assert_eq!(written, 2);

        let state = registry.state(shared).expect("registered");
        assert_eq!((state.screen_width, state.screen_height), (800.0, 600.0));
        assert_eq!(state.uv_transform, uv);
        assert_eq!(state.raw_value_to_meters, 0.001);

        let state = registry.state(other).expect("registered");
        assert_eq!(state.uv_transform, uv);
        assert_eq!(state.screen_width, 800.0);
    }

    #[test]
    fn test_missing_depth_keeps_previous_mapping() {
        let mut registry = AugmentedMaterialRegistry::new();
        let (_, handle) = transform_material(
            &mut registry,
            &lit_program(),
            DepthTextureId(1),
            &OcclusionConfig::default(),
        )
        .expect("transform");

        let bytes = vec![0u8; 2];
        let uv = Matrix4::from_scale(0.5);
        let frame = create_depth_frame(1, 1, &bytes, uv, 0.002).expect("frame");
        let screen = ScreenInfo {
            width: 10,
            height: 10,
            device_pixel_ratio: 1.0,
        };
        update_uniforms(&mut registry, &screen, Some(&frame));

        let resized = ScreenInfo {
            width: 20,
            ..screen
        };
        update_uniforms(&mut registry, &resized, None);

        let state = registry.state(handle).expect("registered");
        assert_eq!(state.uv_transform, uv);
        assert_eq!(state.raw_value_to_meters, 0.002);
        assert_eq!(state.screen_width, 20.0);
    }

    #[test]
    fn test_occlusion_toggle_and_uniform_layout() {
        let mut registry = AugmentedMaterialRegistry::new();
        let (_, handle) = transform_material(
            &mut registry,
            &lit_program(),
            DepthTextureId(1),
            &OcclusionConfig::default(),
        )
        .expect("transform");

        set_occlusion_enabled(&mut registry, handle, false).expect("known handle");
        let uniform = build_occlusion_uniform(registry.state(handle).expect("registered"));
        assert_eq!(uniform.occlusion_enabled, 0);
        assert_eq!(std::mem::size_of::<OcclusionUniform>(), 80);

        assert!(set_occlusion_enabled(&mut registry, MaterialHandle(9), true).is_err());
    }

    #[test]
    fn test_composed_program_is_valid_wgsl() {
        let mut registry = AugmentedMaterialRegistry::new();
        let (composed, _) = transform_material(
            &mut registry,
            &lit_program(),
            DepthTextureId(1),
            &OcclusionConfig::default(),
        )
        .expect("transform");

        let source = composed.module_source();
        let module = naga::front::wgsl::parse_str(&source)
            .unwrap_or_else(|error| panic!("{}\n{}", error.emit_to_string(&source), source));

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&module)
        .expect("composed module validates");

        let uniforms = module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some("OcclusionUniforms"))
            .map(|(_, ty)| ty.inner.clone())
            .expect("uniform struct declared");
        match uniforms {
            naga::TypeInner::Struct { span, .. } => {
                assert_eq!(span as usize, std::mem::size_of::<OcclusionUniform>())
            }
            other => panic!("unexpected uniform type: {:?}", other),
        }
    }
}
