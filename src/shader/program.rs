//! Structured shading programs
//!
//! Source text marks its stages with `//@stage vertex` / `//@stage fragment`
//! lines and its insertion points with `//@anchor <name>` lines. Everything
//! else is opaque code.

use crate::error::{EngineError, EngineResult};
use std::fmt;

const STAGE_MARKER: &str = "//@stage";
const ANCHOR_MARKER: &str = "//@anchor";

/// Named insertion points a host program may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderAnchor {
    /// Module scope, before any entry point
    Declarations,
    /// Inside the vertex output struct
    Varyings,
    /// After the fog setup in the vertex entry point
    FogVertex,
    /// After the fog application in the fragment entry point
    FogFragment,
    /// After the clipping planes test in the fragment entry point
    ClippingPlanesFragment,
}

impl ShaderAnchor {
    pub fn name(&self) -> &'static str {
        match self {
            ShaderAnchor::Declarations => "declarations",
            ShaderAnchor::Varyings => "varyings",
            ShaderAnchor::FogVertex => "fog_vertex",
            ShaderAnchor::FogFragment => "fog_fragment",
            ShaderAnchor::ClippingPlanesFragment => "clipping_planes_fragment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "declarations" => Some(ShaderAnchor::Declarations),
            "varyings" => Some(ShaderAnchor::Varyings),
            "fog_vertex" => Some(ShaderAnchor::FogVertex),
            "fog_fragment" => Some(ShaderAnchor::FogFragment),
            "clipping_planes_fragment" => Some(ShaderAnchor::ClippingPlanesFragment),
            _ => None,
        }
    }
}

impl fmt::Display for ShaderAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Vertex => "vertex",
            StageKind::Fragment => "fragment",
        }
    }
}

/// Lighting model of the material the program belongs to.
///
/// Shadow-only materials have no clipping planes chunk in their fragment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingModel {
    Unlit,
    Lit,
    ShadowOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageChunk {
    Code(String),
    Anchor(ShaderAnchor),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStage {
    pub kind: StageKind,
    pub chunks: Vec<StageChunk>,
}

impl ShaderStage {
    pub fn has_anchor(&self, anchor: ShaderAnchor) -> bool {
        self.chunks
            .iter()
            .any(|chunk| matches!(chunk, StageChunk::Anchor(a) if *a == anchor))
    }

    fn anchor_count(&self, anchor: ShaderAnchor) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| matches!(chunk, StageChunk::Anchor(a) if *a == anchor))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderProgram {
    pub name: String,
    pub shading_model: ShadingModel,
    pub vertex: ShaderStage,
    pub fragment: ShaderStage,
}

/// Errors raised while reading annotated program source
#[derive(Debug, thiserror::Error)]
pub enum ProgramParseError {
    #[error("Unknown anchor '{name}' on line {line}")]
    UnknownAnchor { line: usize, name: String },
    #[error("Unknown stage '{name}' on line {line}")]
    UnknownStage { line: usize, name: String },
    #[error("Program has no {0} stage")]
    MissingStage(&'static str),
    #[error("Program source is empty")]
    Empty,
}

impl ShaderProgram {
    /// Split annotated source into stages, code chunks and anchors
    pub fn parse(
        name: impl Into<String>,
        shading_model: ShadingModel,
        source: &str,
    ) -> Result<Self, ProgramParseError> {
        if source.trim().is_empty() {
            return Err(ProgramParseError::Empty);
        }

        let mut vertex: Option<ShaderStage> = None;
        let mut fragment: Option<ShaderStage> = None;
        let mut current: Option<ShaderStage> = None;
        let mut code = String::new();

        for (index, line) in source.lines().enumerate() {
            let trimmed = line.trim();

            if let Some(rest) = trimmed.strip_prefix(STAGE_MARKER) {
                let kind = match rest.trim() {
                    "vertex" => StageKind::Vertex,
                    "fragment" => StageKind::Fragment,
                    other => {
                        return Err(ProgramParseError::UnknownStage {
                            line: index + 1,
                            name: other.to_string(),
                        })
                    }
                };
                if let Some(mut stage) = current.take() {
                    flush_code(&mut stage, &mut code);
                    store_stage(stage, &mut vertex, &mut fragment);
                }
                code.clear();
                current = Some(ShaderStage {
                    kind,
                    chunks: Vec::new(),
                });
                continue;
            }

            let Some(stage) = current.as_mut() else {
                // Text before the first stage marker is ignored
                continue;
            };

            if let Some(rest) = trimmed.strip_prefix(ANCHOR_MARKER) {
                let anchor_name = rest.trim();
                let anchor = ShaderAnchor::from_name(anchor_name).ok_or_else(|| {
                    ProgramParseError::UnknownAnchor {
                        line: index + 1,
                        name: anchor_name.to_string(),
                    }
                })?;
                flush_code(stage, &mut code);
                stage.chunks.push(StageChunk::Anchor(anchor));
            } else {
                code.push_str(line);
                code.push('\n');
            }
        }

        if let Some(mut stage) = current.take() {
            flush_code(&mut stage, &mut code);
            store_stage(stage, &mut vertex, &mut fragment);
        }

        Ok(ShaderProgram {
            name: name.into(),
            shading_model,
            vertex: vertex.ok_or(ProgramParseError::MissingStage("vertex"))?,
            fragment: fragment.ok_or(ProgramParseError::MissingStage("fragment"))?,
        })
    }

    pub fn stage(&self, kind: StageKind) -> &ShaderStage {
        match kind {
            StageKind::Vertex => &self.vertex,
            StageKind::Fragment => &self.fragment,
        }
    }

    fn stage_mut(&mut self, kind: StageKind) -> &mut ShaderStage {
        match kind {
            StageKind::Vertex => &mut self.vertex,
            StageKind::Fragment => &mut self.fragment,
        }
    }
}

fn flush_code(stage: &mut ShaderStage, code: &mut String) {
    if !code.is_empty() {
        stage.chunks.push(StageChunk::Code(std::mem::take(code)));
    }
}

fn store_stage(
    stage: ShaderStage,
    vertex: &mut Option<ShaderStage>,
    fragment: &mut Option<ShaderStage>,
) {
    match stage.kind {
        StageKind::Vertex => *vertex = Some(stage),
        StageKind::Fragment => *fragment = Some(stage),
    }
}

/// One piece of code to place right after an anchor
#[derive(Debug, Clone, PartialEq)]
pub struct Insertion {
    pub stage: StageKind,
    pub anchor: ShaderAnchor,
    pub code: String,
}

/// Ordered insertions; several insertions at one anchor keep their order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramPatch {
    pub insertions: Vec<Insertion>,
}

impl ProgramPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, stage: StageKind, anchor: ShaderAnchor, code: impl Into<String>) -> Self {
        self.insertions.push(Insertion {
            stage,
            anchor,
            code: code.into(),
        });
        self
    }
}

/// Apply a patch, returning a new program with the code placed after each anchor.
///
/// Anchors stay in the result so further patches can be composed on top.
pub fn compose_program(program: &ShaderProgram, patch: &ProgramPatch) -> EngineResult<ShaderProgram> {
    for insertion in &patch.insertions {
        let stage = program.stage(insertion.stage);
        match stage.anchor_count(insertion.anchor) {
            0 => {
                return Err(EngineError::MissingShaderAnchor {
                    program: program.name.clone(),
                    stage: insertion.stage.name().to_string(),
                    anchor: insertion.anchor.name().to_string(),
                })
            }
            1 => {}
            _ => {
                return Err(EngineError::DuplicateShaderAnchor {
                    program: program.name.clone(),
                    stage: insertion.stage.name().to_string(),
                    anchor: insertion.anchor.name().to_string(),
                })
            }
        }
    }

    let mut composed = program.clone();
    for kind in [StageKind::Vertex, StageKind::Fragment] {
        let stage = composed.stage_mut(kind);
        let mut chunks = Vec::with_capacity(stage.chunks.len() + patch.insertions.len());

        for chunk in stage.chunks.drain(..) {
            let anchor = match &chunk {
                StageChunk::Anchor(anchor) => Some(*anchor),
                StageChunk::Code(_) => None,
            };
            chunks.push(chunk);

            let Some(anchor) = anchor else { continue };
            // Code already following this anchor comes after the new insertions
            let mut inserted = Vec::new();
            for insertion in &patch.insertions {
                if insertion.stage == kind && insertion.anchor == anchor {
                    inserted.push(StageChunk::Code(with_newline(&insertion.code)));
                }
            }
            chunks.extend(inserted);
        }

        stage.chunks = chunks;
    }

    log::debug!(
        "[program::compose_program] Applied {} insertions to '{}'",
        patch.insertions.len(),
        program.name
    );
    Ok(composed)
}

fn with_newline(code: &str) -> String {
    if code.ends_with('\n') {
        code.to_string()
    } else {
        format!("{}\n", code)
    }
}

/// Final program text, one string per stage
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedProgram {
    pub name: String,
    pub vertex_source: String,
    pub fragment_source: String,
}

impl ComposedProgram {
    /// Both stages as a single WGSL module
    pub fn module_source(&self) -> String {
        format!("{}\n{}", self.vertex_source, self.fragment_source)
    }
}

/// Flatten a program back to text, keeping anchor markers
pub fn render_program(program: &ShaderProgram) -> ComposedProgram {
    ComposedProgram {
        name: program.name.clone(),
        vertex_source: render_stage(&program.vertex),
        fragment_source: render_stage(&program.fragment),
    }
}

fn render_stage(stage: &ShaderStage) -> String {
    let mut source = String::new();
    for chunk in &stage.chunks {
        match chunk {
            StageChunk::Code(code) => source.push_str(code),
            StageChunk::Anchor(anchor) => {
                source.push_str(ANCHOR_MARKER);
                source.push(' ');
                source.push_str(anchor.name());
                source.push('\n');
            }
        }
    }
    source
}
