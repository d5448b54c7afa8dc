use crate::error::LinkError;
use crate::registry::{TextureSlot, UniformLayout};
use crate::types::UniformKind;

use super::channels::GpuTexture;

/// Stride of one tightly packed `vec2` position.
const VERTEX_STRIDE: wgpu::BufferAddress = 8;

pub(crate) fn create_uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("uniform layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Layout for set 1, or `None` when the schema has no textures.
pub(crate) fn create_texture_layout(
    device: &wgpu::Device,
    layout: &UniformLayout,
) -> Option<wgpu::BindGroupLayout> {
    if layout.textures().is_empty() {
        return None;
    }
    Some(device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("texture layout"),
        entries: &build_texture_layout_entries(layout.textures()),
    }))
}

fn build_texture_layout_entries(slots: &[TextureSlot]) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(slots.len() * 2);
    for slot in slots {
        let view_dimension = match slot.kind {
            UniformKind::TextureCube => wgpu::TextureViewDimension::Cube,
            _ => wgpu::TextureViewDimension::D2,
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot.texture_binding(),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot.sampler_binding(),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

pub(crate) fn create_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    bound: &[(&TextureSlot, &GpuTexture)],
) -> wgpu::BindGroup {
    let mut entries = Vec::with_capacity(bound.len() * 2);
    for (slot, texture) in bound {
        entries.push(wgpu::BindGroupEntry {
            binding: slot.texture_binding(),
            resource: wgpu::BindingResource::TextureView(&texture.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: slot.sampler_binding(),
            resource: wgpu::BindingResource::Sampler(&texture.sampler),
        });
    }
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("texture bind group"),
        layout,
        entries: &entries,
    })
}

pub(crate) struct PipelineTargets<'a> {
    pub uniform_layout: &'a wgpu::BindGroupLayout,
    pub texture_layout: Option<&'a wgpu::BindGroupLayout>,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
}

/// Links both stages into a render pipeline. Interface mismatches between
/// the stages surface here as validation errors.
pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    targets: &PipelineTargets<'_>,
) -> Result<wgpu::RenderPipeline, LinkError> {
    let mut bind_group_layouts = vec![targets.uniform_layout];
    bind_group_layouts.extend(targets.texture_layout);

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("backdrop pipeline layout"),
        bind_group_layouts: &bind_group_layouts,
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("backdrop pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: VERTEX_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: targets.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: targets.format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });

    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(LinkError {
            log: err.to_string(),
        }),
        None => Ok(pipeline),
    }
}
