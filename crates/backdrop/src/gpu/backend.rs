use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::backend::{
    BufferId, GraphicsBackend, ProgramId, ResourceCounts, ShaderId, TextureId, TextureImage,
};
use crate::compile::compile_shader_module;
use crate::error::{
    CompileError, ContextError, FrameError, GeometryError, LinkError, TextureError,
};
use crate::registry::{TextureSlot, UniformLayout};
use crate::types::{ContextAttributes, ShaderSource, SurfaceSize, UniformValue};

use super::channels::{self, GpuTexture};
use super::context::GpuContext;
use super::pipeline::{self, PipelineTargets};
use super::uniforms::UniformBlock;

struct MultisampleTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl MultisampleTarget {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat, size: SurfaceSize, sample_count: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("msaa color target"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }

    fn for_context(context: &GpuContext) -> Option<Self> {
        (context.sample_count > 1).then(|| {
            Self::new(
                &context.device,
                context.surface_format,
                context.size,
                context.sample_count,
            )
        })
    }
}

struct LiveContext {
    context: GpuContext,
    uniform_layout: wgpu::BindGroupLayout,
    multisample_target: Option<MultisampleTarget>,
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    layout: UniformLayout,
    block: UniformBlock,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: Option<wgpu::BindGroupLayout>,
    bound: BTreeMap<String, TextureId>,
    texture_bind_group: Option<wgpu::BindGroup>,
    textures_dirty: bool,
}

impl LinkedProgram {
    /// Rebuilds set 1 after a binding changed. Every slot must be bound.
    fn refresh_textures(
        &mut self,
        device: &wgpu::Device,
        textures: &HashMap<u64, GpuTexture>,
    ) -> Result<(), FrameError> {
        let Some(texture_layout) = self.texture_layout.as_ref() else {
            return Ok(());
        };
        if !self.textures_dirty && self.texture_bind_group.is_some() {
            return Ok(());
        }
        let mut bound = Vec::with_capacity(self.layout.textures().len());
        for slot in self.layout.textures() {
            let texture = self
                .bound
                .get(&slot.name)
                .and_then(|id| textures.get(&id.0))
                .ok_or_else(|| FrameError::Other(format!("no texture bound to `{}`", slot.name)))?;
            bound.push((slot, texture));
        }
        self.texture_bind_group = Some(pipeline::create_texture_bind_group(
            device,
            texture_layout,
            &bound,
        ));
        self.textures_dirty = false;
        Ok(())
    }
}

/// [`GraphicsBackend`] drawing into a winit window through wgpu.
pub struct WgpuBackend {
    live: Option<LiveContext>,
    next_id: u64,
    shaders: HashMap<u64, wgpu::ShaderModule>,
    programs: HashMap<u64, LinkedProgram>,
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, GpuTexture>,
    active: Option<ProgramId>,
    viewport: SurfaceSize,
}

impl WgpuBackend {
    pub fn new(
        window: Arc<Window>,
        size: SurfaceSize,
        attributes: ContextAttributes,
    ) -> Result<Self, ContextError> {
        let context = GpuContext::new(window, size, attributes)?;
        let uniform_layout = pipeline::create_uniform_layout(&context.device);
        let multisample_target = MultisampleTarget::for_context(&context);
        let viewport = context.size;
        Ok(Self {
            live: Some(LiveContext {
                context,
                uniform_layout,
                multisample_target,
            }),
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            active: None,
            viewport,
        })
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsBackend for WgpuBackend {
    fn set_viewport(&mut self, size: SurfaceSize) {
        self.viewport = size;
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if live.context.resize(size) {
            live.multisample_target = MultisampleTarget::for_context(&live.context);
        }
    }

    fn compile_shader(
        &mut self,
        source: &ShaderSource,
        layout: &UniformLayout,
    ) -> Result<ShaderId, CompileError> {
        let Some(live) = self.live.as_ref() else {
            return Err(CompileError {
                stage: source.stage,
                log: "GPU context has been released".into(),
            });
        };
        let module = compile_shader_module(&live.context.device, source, layout)?;
        let id = self.allocate();
        self.shaders.insert(id, module);
        Ok(ShaderId(id))
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &UniformLayout,
    ) -> Result<ProgramId, LinkError> {
        let Some(live) = self.live.as_ref() else {
            return Err(LinkError {
                log: "GPU context has been released".into(),
            });
        };
        let (Some(vertex_module), Some(fragment_module)) =
            (self.shaders.get(&vertex.0), self.shaders.get(&fragment.0))
        else {
            return Err(LinkError {
                log: format!("{vertex} or {fragment} is not a live shader"),
            });
        };
        let device = &live.context.device;

        let texture_layout = pipeline::create_texture_layout(device, layout);
        let render_pipeline = pipeline::create_pipeline(
            device,
            vertex_module,
            fragment_module,
            &PipelineTargets {
                uniform_layout: &live.uniform_layout,
                texture_layout: texture_layout.as_ref(),
                format: live.context.surface_format,
                sample_count: live.context.sample_count,
            },
        )?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform buffer"),
            size: layout.block_size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &live.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let program = LinkedProgram {
            pipeline: render_pipeline,
            layout: layout.clone(),
            block: UniformBlock::new(layout),
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            bound: BTreeMap::new(),
            texture_bind_group: None,
            textures_dirty: true,
        };
        let id = self.allocate();
        self.programs.insert(id, program);
        tracing::debug!(program = id, block_size = layout.block_size(), "linked program");
        Ok(ProgramId(id))
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program.0) {
            self.active = Some(program);
        } else {
            tracing::warn!(%program, "use_program on unknown program");
        }
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader.0);
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        if self.active == Some(program) {
            self.active = None;
        }
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferId, GeometryError> {
        let Some(live) = self.live.as_ref() else {
            return Err(GeometryError::Allocation(
                "GPU context has been released".into(),
            ));
        };
        let buffer = live
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad vertices"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let id = self.allocate();
        self.buffers.insert(id, buffer);
        Ok(BufferId(id))
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer.0);
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, TextureError> {
        let Some(live) = self.live.as_ref() else {
            return Err(TextureError::Upload("GPU context has been released".into()));
        };
        let texture = channels::upload(
            &live.context.device,
            &live.context.queue,
            image,
            live.context.max_texture_dimension,
        )?;
        let id = self.allocate();
        self.textures.insert(id, texture);
        Ok(TextureId(id))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
    }

    fn bind_texture(&mut self, program: ProgramId, slot: &TextureSlot, texture: TextureId) {
        let Some(linked) = self.programs.get_mut(&program.0) else {
            return;
        };
        match self.textures.get(&texture.0) {
            Some(uploaded) if uploaded.kind == slot.kind => {
                linked.bound.insert(slot.name.clone(), texture);
                linked.textures_dirty = true;
            }
            _ => tracing::warn!(%texture, uniform = %slot.name, "cannot bind texture to slot"),
        }
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        let Some(linked) = self.programs.get_mut(&program.0) else {
            return;
        };
        if !linked.block.write_field(&linked.layout, name, &value) {
            tracing::trace!(uniform = name, "uniform not in block; ignoring");
        }
    }

    fn draw_triangle_strip(
        &mut self,
        buffer: BufferId,
        first: u32,
        count: u32,
    ) -> Result<(), FrameError> {
        let Some(live) = self.live.as_mut() else {
            return Err(FrameError::Other("GPU context has been released".into()));
        };
        let program = self
            .active
            .and_then(|id| self.programs.get_mut(&id.0))
            .ok_or_else(|| FrameError::Other("no program in use".into()))?;
        let vertices = self
            .buffers
            .get(&buffer.0)
            .ok_or_else(|| FrameError::Other(format!("{buffer} is not a live buffer")))?;

        program.refresh_textures(&live.context.device, &self.textures)?;
        program.block.set_viewport(self.viewport);
        live.context
            .queue
            .write_buffer(&program.uniform_buffer, 0, program.block.as_bytes());

        let frame = live.context.acquire_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = live
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("backdrop encoder"),
            });

        {
            let (attachment_view, resolve_target) = match live.multisample_target.as_ref() {
                Some(msaa) => (&msaa.view, Some(&view)),
                None => (&view, None),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: attachment_view,
                    depth_slice: None,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &program.uniform_bind_group, &[]);
            if let Some(textures) = program.texture_bind_group.as_ref() {
                render_pass.set_bind_group(1, textures, &[]);
            }
            render_pass.set_vertex_buffer(0, vertices.slice(..));
            render_pass.draw(first..first + count, 0..1);
        }

        live.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn resource_counts(&self) -> ResourceCounts {
        ResourceCounts {
            shaders: self.shaders.len(),
            programs: self.programs.len(),
            buffers: self.buffers.len(),
            textures: self.textures.len(),
        }
    }

    fn release(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };
        self.active = None;
        self.programs.clear();
        self.shaders.clear();
        self.buffers.clear();
        self.textures.clear();
        drop(live);
        tracing::debug!("released GPU context");
    }
}
