//! GPU textures behind [`TargetHandle`](crate::TargetHandle)s.

use crate::backend::{ColorPrecision, Extent, FilterMode, Sampling, WrapMode};

pub(crate) fn texture_format(precision: ColorPrecision) -> wgpu::TextureFormat {
    match precision {
        ColorPrecision::Float => wgpu::TextureFormat::Rgba32Float,
        ColorPrecision::HalfFloat => wgpu::TextureFormat::Rgba16Float,
    }
}

/// An off-screen texture that one pass renders into and later passes sample.
pub(crate) struct GpuTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: Extent,
    pub sampling: Sampling,
    label: String,
}

impl GpuTarget {
    pub(crate) fn new(
        device: &wgpu::Device,
        label: &str,
        size: Extent,
        format: wgpu::TextureFormat,
        sampling: Sampling,
    ) -> Self {
        let size = size.at_least_one();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
            sampling,
            label: label.to_string(),
        }
    }

    /// Reallocates at `size`; contents are lost.
    pub(crate) fn resize(&mut self, device: &wgpu::Device, size: Extent) {
        if self.size != size.at_least_one() {
            *self = Self::new(device, &self.label, size, self.texture.format(), self.sampling);
        }
    }
}

/// One sampler for every filter and wrap combination.
pub(crate) struct Samplers {
    by_mode: [[wgpu::Sampler; 2]; 2],
}

impl Samplers {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let make = |filter, wrap| create_sampler(device, Sampling { filter, wrap });
        Self {
            by_mode: [
                [
                    make(FilterMode::Nearest, WrapMode::ClampToEdge),
                    make(FilterMode::Nearest, WrapMode::Repeat),
                ],
                [
                    make(FilterMode::Linear, WrapMode::ClampToEdge),
                    make(FilterMode::Linear, WrapMode::Repeat),
                ],
            ],
        }
    }

    pub(crate) fn get(&self, sampling: Sampling) -> &wgpu::Sampler {
        let filter = match sampling.filter {
            FilterMode::Nearest => 0,
            FilterMode::Linear => 1,
        };
        let wrap = match sampling.wrap {
            WrapMode::ClampToEdge => 0,
            WrapMode::Repeat => 1,
        };
        &self.by_mode[filter][wrap]
    }
}

fn create_sampler(device: &wgpu::Device, sampling: Sampling) -> wgpu::Sampler {
    let address_mode = match sampling.wrap {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
    };
    let filter = match sampling.filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Target Sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}
