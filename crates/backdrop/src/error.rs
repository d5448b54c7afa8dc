use crate::types::{ShaderStage, UniformKind};

/// No GPU context could be obtained for the host surface.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("GPU context unavailable: {0}")]
    Unavailable(String),
}

/// Shader stage failed to compile; `log` carries the driver diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} shader failed to compile:\n{log}")]
pub struct CompileError {
    pub stage: ShaderStage,
    pub log: String,
}

/// Vertex/fragment pair failed to link into a program.
#[derive(Debug, Clone, thiserror::Error)]
#[error("shader program failed to link:\n{log}")]
pub struct LinkError {
    pub log: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("failed to allocate vertex buffer: {0}")]
    Allocation(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("failed to read texture {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("cubemap face {face} missing in {directory}")]
    MissingFace { directory: String, face: String },
    #[error("cubemap faces must be square and equally sized ({0})")]
    FaceMismatch(String),
    #[error("texture upload failed: {0}")]
    Upload(String),
}

/// Problems with the uniform schema itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("uniform `{0}` is declared more than once")]
    Duplicate(String),
    #[error("`{0}` is not a valid GLSL identifier")]
    InvalidName(String),
    #[error("uniform `{name}` cannot use role {role} with kind {kind}")]
    RoleMismatch {
        name: String,
        role: String,
        kind: UniformKind,
    },
}

/// Rejected attempt to set a uniform value or bind a texture.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniformError {
    #[error("uniform `{0}` is not part of the active program's schema")]
    Unknown(String),
    #[error("uniform `{name}` expects {expected}, got {found}")]
    KindMismatch {
        name: String,
        expected: UniformKind,
        found: UniformKind,
    },
    #[error("uniform `{0}` is driven by the engine and cannot be set directly")]
    EngineOwned(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid variant configuration: {0}")]
    Invalid(String),
}

/// Failure while presenting one frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Surface was lost or outdated and has been reconfigured.
    #[error("surface lost; reconfigured for next frame")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("GPU out of memory")]
    OutOfMemory,
    #[error("surface error: {0}")]
    Other(String),
}

impl FrameError {
    /// Recoverable errors leave the frame loop running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FrameError::OutOfMemory)
    }
}

/// Aggregate failure returned by `attach` and `reconfigure`.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Uniform(#[from] UniformError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
