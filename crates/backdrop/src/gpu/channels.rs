use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::backend::TextureImage;
use crate::error::TextureError;
use crate::types::UniformKind;

/// Uploaded texture plus the view and sampler a bind group needs.
pub(crate) struct GpuTexture {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub kind: UniformKind,
}

pub(crate) fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &TextureImage,
    max_dimension: u32,
) -> Result<GpuTexture, TextureError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
        return Err(TextureError::Upload(format!(
            "{width}x{height} exceeds the device limit of {max_dimension}"
        )));
    }
    let (layers, view_dimension, label) = match image {
        TextureImage::Flat { .. } => (1, wgpu::TextureViewDimension::D2, "backdrop texture"),
        TextureImage::Cube { .. } => (6, wgpu::TextureViewDimension::Cube, "backdrop cubemap"),
    };
    let expected = rgba_len(width, height, layers).ok_or_else(|| {
        TextureError::Upload(format!("{width}x{height}x{layers} texture is too large"))
    })?;
    if image.pixels().len() != expected {
        return Err(TextureError::Upload(format!(
            "expected {expected} bytes of RGBA data, got {}",
            image.pixels().len()
        )));
    }

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        image.pixels(),
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(view_dimension),
        array_layer_count: Some(layers),
        ..Default::default()
    });
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    Ok(GpuTexture {
        _texture: texture,
        view,
        sampler,
        kind: image.kind(),
    })
}

/// Bytes of tightly packed RGBA8 data, or `None` if that overflows `usize`.
fn rgba_len(width: u32, height: u32, layers: u32) -> Option<usize> {
    [height, layers]
        .into_iter()
        .try_fold(usize::try_from(width).ok()?.checked_mul(4)?, |len, dim| {
            len.checked_mul(usize::try_from(dim).ok()?)
        })
}
