//! wgpu implementation of the graphics backend.
//!
//! - `context` owns the instance, device and surface and rebuilds the
//!   swapchain when the window resizes.
//! - `pipeline` turns a compiled vertex/fragment pair into a render pipeline
//!   with one uniform bind group and an optional texture bind group.
//! - `uniforms` keeps each program's std140 block on the CPU and uploads it
//!   once per draw.
//! - `channels` uploads decoded images and cubemaps.
//! - `backend` maps the id-based [`GraphicsBackend`](crate::GraphicsBackend)
//!   calls onto the above.

mod backend;
mod channels;
mod context;
mod pipeline;
mod uniforms;

pub use backend::WgpuBackend;
