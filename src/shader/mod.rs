//! Shader Module - structured programs and occlusion injection
//!
//! Programs are held as stages of code chunks separated by tagged anchors.
//! Extra logic is composed in through an ordered list of (stage, anchor, code)
//! insertions, resolved when the program is built; a missing anchor fails the
//! build instead of silently dropping the insertion.

pub mod occlusion;
pub mod program;

pub use program::{
    compose_program, render_program, ComposedProgram, Insertion, ProgramParseError,
    ProgramPatch, ShaderAnchor, ShaderProgram, ShaderStage, ShadingModel, StageChunk, StageKind,
};

pub use occlusion::{
    build_occlusion_uniform, fragment_anchor, occlusion_patch, set_occlusion_enabled, transform_material,
    update_uniforms, upload_material_uniforms, AugmentedMaterialRegistry, AugmentedMaterialState,
    MaterialHandle, OcclusionUniform, ScreenInfo,
};
