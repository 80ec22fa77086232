use anyhow::{bail, Result};

use super::{TextureFilter, TextureParams, TextureWrap};

const BYTES_PER_PIXEL: u32 = 4;

/// GPU storage behind a texture handle.
///
/// The handle is created before any pixels are known, so the wgpu texture is
/// allocated lazily on the first upload and reallocated whenever the upload
/// size changes. The sampler is fixed at creation.
pub(crate) struct TextureSlot {
    params: TextureParams,
    sampler: wgpu::Sampler,
    allocation: Option<Allocation>,
}

struct Allocation {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl TextureSlot {
    pub fn new(device: &wgpu::Device, params: TextureParams, label: &str) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: address_mode(params.wrap_s),
            address_mode_v: address_mode(params.wrap_t),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter_mode(params.mag_filter),
            min_filter: filter_mode(params.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            params,
            sampler,
            allocation: None,
        }
    }

    pub fn params(&self) -> TextureParams {
        self.params
    }

    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.allocation.as_ref().map(|allocation| &allocation.bind_group)
    }

    pub fn write(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<()> {
        let expected = (width * height * BYTES_PER_PIXEL) as usize;
        if width == 0 || height == 0 || rgba.len() != expected {
            bail!(
                "texture upload of {} bytes does not match {width}x{height} RGBA",
                rgba.len()
            );
        }

        let needs_allocation = self
            .allocation
            .as_ref()
            .map_or(true, |allocation| {
                allocation.width != width || allocation.height != height
            });
        if needs_allocation {
            tracing::debug!(width, height, "allocating texture storage");
            self.allocation = Some(self.allocate(device, layout, width, height));
        }
        let Some(allocation) = self.allocation.as_ref() else {
            bail!("texture storage missing after allocation");
        };

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &allocation.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * BYTES_PER_PIXEL),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn allocate(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        width: u32,
        height: u32,
    ) -> Allocation {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("camera frame texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera frame bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        Allocation {
            texture,
            bind_group,
            width,
            height,
        }
    }
}

fn address_mode(wrap: TextureWrap) -> wgpu::AddressMode {
    match wrap {
        TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn filter_mode(filter: TextureFilter) -> wgpu::FilterMode {
    match filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    }
}
