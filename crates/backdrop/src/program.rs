//! Compiles and links a vertex/fragment pair into one program.

use tracing::{debug, warn};

use crate::backend::{GraphicsBackend, ProgramId, ShaderId};
use crate::error::InitError;
use crate::registry::UniformLayout;
use crate::types::ShaderSource;

/// A linked program together with the shader objects it was built from.
#[derive(Debug)]
pub struct ProgramHandle {
    pub program: ProgramId,
    pub vertex: ShaderId,
    pub fragment: ShaderId,
    pub layout: UniformLayout,
}

impl ProgramHandle {
    /// Deletes the program and both shaders.
    pub fn release<B>(self, backend: &mut B)
    where
        B: GraphicsBackend + ?Sized,
    {
        backend.delete_program(self.program);
        backend.delete_shader(self.vertex);
        backend.delete_shader(self.fragment);
        debug!(program = %self.program, "released shader program");
    }
}

/// Compiles both stages and links them.
///
/// Whatever fails, every shader created along the way is deleted before the
/// error is returned, so no partially built program survives.
pub fn build_program<B>(
    backend: &mut B,
    vertex: &ShaderSource,
    fragment: &ShaderSource,
    layout: UniformLayout,
) -> Result<ProgramHandle, InitError>
where
    B: GraphicsBackend + ?Sized,
{
    let vertex_id = backend.compile_shader(vertex, &layout).map_err(|err| {
        warn!(stage = %err.stage, "shader compilation failed");
        err
    })?;

    let fragment_id = match backend.compile_shader(fragment, &layout) {
        Ok(id) => id,
        Err(err) => {
            warn!(stage = %err.stage, "shader compilation failed");
            backend.delete_shader(vertex_id);
            return Err(err.into());
        }
    };

    let program = match backend.link_program(vertex_id, fragment_id, &layout) {
        Ok(program) => program,
        Err(err) => {
            warn!("shader program failed to link");
            backend.delete_shader(vertex_id);
            backend.delete_shader(fragment_id);
            return Err(err.into());
        }
    };

    debug!(
        %program,
        uniforms = layout.specs().len(),
        textures = layout.textures().len(),
        block_size = layout.block_size(),
        "linked shader program"
    );

    Ok(ProgramHandle {
        program,
        vertex: vertex_id,
        fragment: fragment_id,
        layout,
    })
}
