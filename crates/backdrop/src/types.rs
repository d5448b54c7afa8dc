use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Pipeline stage a piece of GLSL source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Immutable GLSL text for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub stage: ShaderStage,
    pub text: String,
}

impl ShaderSource {
    pub fn vertex(text: impl Into<String>) -> Self {
        Self {
            stage: ShaderStage::Vertex,
            text: text.into(),
        }
    }

    pub fn fragment(text: impl Into<String>) -> Self {
        Self {
            stage: ShaderStage::Fragment,
            text: text.into(),
        }
    }
}

/// GLSL type of a uniform declared by a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformKind {
    Scalar,
    Vec2,
    Vec3,
    Mat2,
    Texture2D,
    TextureCube,
}

impl UniformKind {
    pub fn is_texture(self) -> bool {
        matches!(self, UniformKind::Texture2D | UniformKind::TextureCube)
    }

    /// GLSL spelling used when the uniform block is generated.
    pub fn glsl_type(self) -> &'static str {
        match self {
            UniformKind::Scalar => "float",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Mat2 => "mat2",
            UniformKind::Texture2D => "sampler2D",
            UniformKind::TextureCube => "samplerCube",
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl_type())
    }
}

/// Where the engine takes a uniform's value from on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformRole {
    /// Elapsed seconds since the first frame.
    Time,
    /// Surface size in device pixels.
    Resolution,
    /// Last pointer or primary-touch position.
    Pointer,
    /// Caller supplied RGB triple.
    Color,
    /// Bound texture; never pushed as a value.
    Texture,
    /// Caller supplied scalar, vector or matrix.
    Custom,
}

impl UniformRole {
    /// Kind implied by the role when a manifest leaves it out.
    pub fn default_kind(self) -> Option<UniformKind> {
        match self {
            UniformRole::Time => Some(UniformKind::Scalar),
            UniformRole::Resolution | UniformRole::Pointer => Some(UniformKind::Vec2),
            UniformRole::Color => Some(UniformKind::Vec3),
            UniformRole::Texture => Some(UniformKind::Texture2D),
            UniformRole::Custom => None,
        }
    }

    pub fn accepts(self, kind: UniformKind) -> bool {
        match self {
            UniformRole::Time => kind == UniformKind::Scalar,
            UniformRole::Resolution | UniformRole::Pointer => kind == UniformKind::Vec2,
            UniformRole::Color => kind == UniformKind::Vec3,
            UniformRole::Texture => kind.is_texture(),
            UniformRole::Custom => !kind.is_texture(),
        }
    }

    /// True when the value comes from the caller rather than engine state.
    pub fn is_caller_supplied(self) -> bool {
        matches!(self, UniformRole::Color | UniformRole::Custom)
    }
}

/// One entry of a variant's uniform schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformSpec {
    pub name: String,
    pub kind: UniformKind,
    pub role: UniformRole,
}

impl UniformSpec {
    pub fn new(name: impl Into<String>, kind: UniformKind, role: UniformRole) -> Self {
        Self {
            name: name.into(),
            kind,
            role,
        }
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Scalar, UniformRole::Time)
    }

    pub fn resolution(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Vec2, UniformRole::Resolution)
    }

    pub fn pointer(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Vec2, UniformRole::Pointer)
    }

    pub fn color(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Vec3, UniformRole::Color)
    }

    pub fn texture(name: impl Into<String>) -> Self {
        Self::new(name, UniformKind::Texture2D, UniformRole::Texture)
    }

    pub fn custom(name: impl Into<String>, kind: UniformKind) -> Self {
        Self::new(name, kind, UniformRole::Custom)
    }
}

/// Numeric value pushed into a uniform.
///
/// Manifests spell these as a bare number, or an array of 2, 3 or 4 floats
/// (the last being a column-major `mat2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Mat2([f32; 4]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Scalar(_) => UniformKind::Scalar,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Mat2(_) => UniformKind::Mat2,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        match self {
            UniformValue::Scalar(value) => std::slice::from_ref(value),
            UniformValue::Vec2(value) => value,
            UniformValue::Vec3(value) => value,
            UniformValue::Mat2(value) => value,
        }
    }

    /// Zero value (identity for `mat2`) for a numeric kind.
    pub fn zero(kind: UniformKind) -> Option<Self> {
        match kind {
            UniformKind::Scalar => Some(UniformValue::Scalar(0.0)),
            UniformKind::Vec2 => Some(UniformValue::Vec2([0.0; 2])),
            UniformKind::Vec3 => Some(UniformValue::Vec3([0.0; 3])),
            UniformKind::Mat2 => Some(UniformValue::Mat2([1.0, 0.0, 0.0, 1.0])),
            UniformKind::Texture2D | UniformKind::TextureCube => None,
        }
    }
}

/// Expected face stems for cubemap resources stored on disk.
pub const CUBEMAP_FACE_STEMS: [&str; 6] = ["posx", "negx", "posy", "negy", "posz", "negz"];

/// Describes how a texture uniform should be populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TextureSource {
    /// Image file decoded with the `image` crate.
    Image { path: PathBuf },
    /// Directory with six faces named after [`CUBEMAP_FACE_STEMS`].
    Cubemap { directory: PathBuf },
    /// Procedurally generated greyscale value noise.
    Noise {
        #[serde(default = "default_noise_size")]
        size: u32,
        #[serde(default)]
        seed: u64,
    },
}

fn default_noise_size() -> u32 {
    256
}

impl TextureSource {
    pub fn kind(&self) -> UniformKind {
        match self {
            TextureSource::Cubemap { .. } => UniformKind::TextureCube,
            TextureSource::Image { .. } | TextureSource::Noise { .. } => UniformKind::Texture2D,
        }
    }
}

/// Attributes negotiated when the drawing context is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextAttributes {
    /// Keep an alpha channel so the compositor can blend the surface.
    pub alpha: bool,
    /// Request multisampling.
    pub antialias: bool,
}

impl Default for ContextAttributes {
    /// Matches what a browser hands out when no attributes are given.
    fn default() -> Self {
        Self {
            alpha: true,
            antialias: true,
        }
    }
}

/// Surface dimensions in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_uniform(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pointer coordinates in surface space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerPosition {
    pub x: f32,
    pub y: f32,
}

impl PointerPosition {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn as_uniform(&self) -> [f32; 2] {
        [self.x, self.y]
    }
}
