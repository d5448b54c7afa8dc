//! The one piece of geometry every variant draws: a full-viewport quad.

use crate::backend::{BufferId, GraphicsBackend};
use crate::error::{FrameError, GeometryError};

/// Clip-space corners in triangle-strip order.
pub const QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

pub const QUAD_VERTEX_COUNT: u32 = 4;

/// Uploads the quad into a static vertex buffer.
pub fn upload_quad<B>(backend: &mut B) -> Result<BufferId, GeometryError>
where
    B: GraphicsBackend + ?Sized,
{
    let buffer = backend.create_vertex_buffer(&QUAD_VERTICES)?;
    tracing::debug!(%buffer, "uploaded full-viewport quad");
    Ok(buffer)
}

pub fn draw_quad<B>(backend: &mut B, buffer: BufferId) -> Result<(), FrameError>
where
    B: GraphicsBackend + ?Sized,
{
    backend.draw_triangle_strip(buffer, 0, QUAD_VERTEX_COUNT)
}
