//! Graphics backend abstraction.
//!
//! The engine talks to the GPU exclusively through [`GraphicsBackend`]. Every
//! object it creates is identified by an opaque id so the engine can track
//! and release ownership without holding backend types. `gpu::WgpuBackend`
//! is the production implementation.

use std::fmt;

use crate::error::{CompileError, FrameError, GeometryError, LinkError, TextureError};
use crate::registry::{TextureSlot, UniformLayout};
use crate::types::{ShaderSource, SurfaceSize, UniformKind, UniformValue};

macro_rules! resource_id {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

resource_id!(ShaderId, "shader");
resource_id!(ProgramId, "program");
resource_id!(BufferId, "buffer");
resource_id!(TextureId, "texture");

/// Decoded RGBA8 pixels ready for upload.
#[derive(Clone, PartialEq, Eq)]
pub enum TextureImage {
    Flat {
        width: u32,
        height: u32,
        rgba: Vec<u8>,
    },
    /// Six square faces in `CUBEMAP_FACE_STEMS` order, concatenated.
    Cube { size: u32, rgba: Vec<u8> },
}

impl TextureImage {
    /// 1x1 stand-in bound while the real texture loads.
    pub fn placeholder(kind: UniformKind) -> Self {
        match kind {
            UniformKind::TextureCube => {
                let mut rgba = Vec::with_capacity(6 * 4);
                for face in 0..6 {
                    let value = if face % 2 == 0 { 255 } else { 0 };
                    rgba.extend([value, value, value, 255]);
                }
                TextureImage::Cube { size: 1, rgba }
            }
            _ => TextureImage::Flat {
                width: 1,
                height: 1,
                rgba: vec![255, 255, 255, 25],
            },
        }
    }

    pub fn kind(&self) -> UniformKind {
        match self {
            TextureImage::Flat { .. } => UniformKind::Texture2D,
            TextureImage::Cube { .. } => UniformKind::TextureCube,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            TextureImage::Flat { width, height, .. } => (*width, *height),
            TextureImage::Cube { size, .. } => (*size, *size),
        }
    }

    pub fn pixels(&self) -> &[u8] {
        match self {
            TextureImage::Flat { rgba, .. } | TextureImage::Cube { rgba, .. } => rgba,
        }
    }
}

impl fmt::Debug for TextureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("TextureImage")
            .field("kind", &self.kind())
            .field("width", &width)
            .field("height", &height)
            .field("bytes", &self.pixels().len())
            .finish()
    }
}

/// Live object counts, used for leak diagnostics on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceCounts {
    pub shaders: usize,
    pub programs: usize,
    pub buffers: usize,
    pub textures: usize,
}

impl ResourceCounts {
    pub fn is_empty(&self) -> bool {
        *self == ResourceCounts::default()
    }
}

/// A drawing context bound to one host surface.
///
/// Calls happen on the host thread only. `compile_shader` must free its
/// shader object before returning an error; `link_program` never deletes its
/// inputs.
pub trait GraphicsBackend {
    fn set_viewport(&mut self, size: SurfaceSize);

    fn compile_shader(
        &mut self,
        source: &ShaderSource,
        layout: &UniformLayout,
    ) -> Result<ShaderId, CompileError>;

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &UniformLayout,
    ) -> Result<ProgramId, LinkError>;

    fn use_program(&mut self, program: ProgramId);

    fn delete_shader(&mut self, shader: ShaderId);

    fn delete_program(&mut self, program: ProgramId);

    /// Uploads static vertex data (tightly packed `vec2` positions).
    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferId, GeometryError>;

    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, TextureError>;

    fn delete_texture(&mut self, texture: TextureId);

    fn bind_texture(&mut self, program: ProgramId, slot: &TextureSlot, texture: TextureId);

    /// Stores a uniform value for `program`; visible to the next draw.
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue);

    /// Draws `count` vertices of `buffer` as a triangle strip and presents.
    fn draw_triangle_strip(
        &mut self,
        buffer: BufferId,
        first: u32,
        count: u32,
    ) -> Result<(), FrameError>;

    fn resource_counts(&self) -> ResourceCounts;

    /// Tears the context down. Calling it twice is a no-op.
    fn release(&mut self);
}
