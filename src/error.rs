//! Error handling for Hearth AR
//!
//! A single error type shared by the depth, shader, tracking and voxel
//! modules. Per-frame absence of platform data is never an error; these
//! variants cover integration and configuration failures only.

use std::error::Error as StdError;
use std::fmt;

/// Main error type for Hearth AR
#[derive(Debug)]
pub enum EngineError {
    // Resource Errors
    BufferAccess {
        index: usize,
        size: usize,
    },
    CorruptedData {
        reason: String,
    },
    ResourceNotFound {
        resource_type: String,
        id: String,
    },

    // Shader Errors
    MissingShaderAnchor {
        program: String,
        stage: String,
        anchor: String,
    },
    DuplicateShaderAnchor {
        program: String,
        stage: String,
        anchor: String,
    },
    ShaderCompilation {
        source: String,
        error: String,
    },

    // Session Errors
    SessionStartFailed {
        reason: String,
    },
    SessionNotActive,
    FeatureDisabled(String),

    // Configuration Errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    // System Errors
    IoError {
        path: String,
        error: String,
    },
    DeserializationError {
        context: String,
        error: String,
    },

    // Generic fallback for unexpected errors
    Internal {
        message: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::BufferAccess { index, size } => write!(
                f,
                "Buffer access out of bounds: index {} >= size {}",
                index, size
            ),
            EngineError::CorruptedData { reason } => write!(f, "Data corrupted: {}", reason),
            EngineError::ResourceNotFound { resource_type, id } => {
                write!(f, "Resource not found: {} '{}'", resource_type, id)
            }

            EngineError::MissingShaderAnchor {
                program,
                stage,
                anchor,
            } => write!(
                f,
                "Shader anchor '{}' missing from {} stage of program '{}'",
                anchor, stage, program
            ),
            EngineError::DuplicateShaderAnchor {
                program,
                stage,
                anchor,
            } => write!(
                f,
                "Shader anchor '{}' declared twice in {} stage of program '{}'",
                anchor, stage, program
            ),
            EngineError::ShaderCompilation { source, error } => {
                write!(f, "Shader compilation failed for {}: {}", source, error)
            }

            EngineError::SessionStartFailed { reason } => {
                write!(f, "AR session failed to start: {}", reason)
            }
            EngineError::SessionNotActive => write!(f, "No active AR session"),
            EngineError::FeatureDisabled(msg) => write!(f, "Feature disabled: {}", msg),

            EngineError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(f, "Invalid config: {} = {} ({})", field, value, reason),

            EngineError::IoError { path, error } => write!(f, "IO error for {}: {}", path, error),
            EngineError::DeserializationError { context, error } => {
                write!(f, "Deserialization error in {}: {}", context, error)
            }

            EngineError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for EngineError {}

/// Type alias for Results in Hearth AR
pub type EngineResult<T> = Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::IoError {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(error: toml::de::Error) -> Self {
        EngineError::DeserializationError {
            context: "config".to_string(),
            error: error.to_string(),
        }
    }
}

impl From<crate::shader::ProgramParseError> for EngineError {
    fn from(err: crate::shader::ProgramParseError) -> Self {
        use crate::shader::ProgramParseError;
        match err {
            ProgramParseError::UnknownAnchor { line, name } => EngineError::ShaderCompilation {
                source: format!("line {}", line),
                error: format!("unknown anchor '{}'", name),
            },
            ProgramParseError::UnknownStage { line, name } => EngineError::ShaderCompilation {
                source: format!("line {}", line),
                error: format!("unknown stage '{}'", name),
            },
            ProgramParseError::MissingStage(stage) => EngineError::ShaderCompilation {
                source: "program".to_string(),
                error: format!("missing {} stage", stage),
            },
            ProgramParseError::Empty => EngineError::ShaderCompilation {
                source: "program".to_string(),
                error: "empty source".to_string(),
            },
        }
    }
}

// Helper functions for common error patterns

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> EngineResult<T>;
    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn context(self, msg: &str) -> EngineResult<T> {
        self.map_err(|e| EngineError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }

    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}
