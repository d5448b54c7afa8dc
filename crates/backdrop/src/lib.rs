//! Animated full-viewport shader backgrounds.
//!
//! A [`VariantConfig`] names a vertex/fragment pair, its uniform schema and
//! any textures. [`EngineHandle::attach`] binds a variant to a [`Host`] and
//! drives it one frame at a time:
//!
//! ```text
//!   VariantConfig ──validate──▶ UniformLayout
//!          │
//!          ▼
//!   EngineHandle::attach ──▶ acquire_context ──▶ build_program ──▶ upload_quad
//!          │                                                          │
//!          ▼                                                          ▼
//!   FrameDriver ──request_frame──▶ host ──on_frame(token)──▶ push uniforms ──▶ draw
//!          ▲                                                          │
//!          └──────────────────────── reschedule ◀─────────────────────┘
//! ```
//!
//! The engine talks to the GPU only through [`GraphicsBackend`]; the
//! production backend is [`WgpuBackend`], which wraps WebGL-style GLSL into
//! Vulkan GLSL for wgpu. [`run_preview`] hosts a variant in a desktop window.

mod backend;
mod compile;
mod config;
mod driver;
mod engine;
mod error;
mod geometry;
mod gpu;
mod host;
mod program;
mod registry;
mod textures;
mod types;
pub mod variants;
mod window;

#[cfg(test)]
mod testing;

pub use backend::{
    BufferId, GraphicsBackend, ProgramId, ResourceCounts, ShaderId, TextureId, TextureImage,
};
pub use config::{ManifestUniform, VariantConfig, VariantManifest};
pub use driver::{DriverState, FrameClock, FrameDriver, FrameStats};
pub use engine::{EngineHandle, FrameSample, TickOutcome};
pub use error::{
    CompileError, ConfigError, ContextError, FrameError, GeometryError, InitError, LinkError,
    SchemaError, TextureError, UniformError,
};
pub use geometry::{draw_quad, upload_quad, QUAD_VERTEX_COUNT, QUAD_VERTICES};
pub use gpu::WgpuBackend;
pub use host::{
    FrameScheduler, FrameToken, Host, HostEvent, HostSurface, InputEvents, ListenerId,
    ListenerKind,
};
pub use program::{build_program, ProgramHandle};
pub use registry::{BlockField, TextureSlot, UniformLayout, VariantRegistry};
pub use textures::{generate_noise, load_texture, LoadedTexture, TextureLoader};
pub use types::{
    ContextAttributes, PointerPosition, ShaderSource, ShaderStage, SurfaceSize, TextureSource,
    UniformKind, UniformRole, UniformSpec, UniformValue, CUBEMAP_FACE_STEMS,
};
pub use window::{run_preview, PreviewConfig, WindowHost};
