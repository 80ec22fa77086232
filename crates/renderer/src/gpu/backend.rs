use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::context::GpuContext;
use super::pipeline::{self, QuadPipeline, QuadVertex};
use super::textures::TextureSlot;
use super::{
    GpuBackend, ProgramHandle, QuadDraw, QuadGeometry, ShaderError, TextureHandle, TextureParams,
};
use crate::types::{PowerPreference, Resolution};

/// [`GpuBackend`] that renders into a winit window through wgpu.
pub struct WgpuBackend {
    context: GpuContext,
    texture_layout: wgpu::BindGroupLayout,
    vertex_buffer: wgpu::Buffer,
    programs: HashMap<ProgramHandle, QuadPipeline>,
    textures: HashMap<TextureHandle, TextureSlot>,
    next_handle: u32,
    // Declared last so the surface is dropped before the window.
    _window: Arc<Window>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>, size: Resolution, power: PowerPreference) -> Result<Self> {
        let context = GpuContext::new(
            window.as_ref(),
            PhysicalSize::new(size.width, size.height),
            power,
        )?;
        let texture_layout = pipeline::texture_bind_group_layout(&context.device);
        let vertex_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("preview quad vertices"),
            size: (std::mem::size_of::<QuadVertex>() * QuadGeometry::VERTEX_COUNT as usize)
                as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::info!(
            width = context.size.width,
            height = context.size.height,
            format = ?context.surface_format,
            "wgpu backend ready"
        );

        Ok(Self {
            context,
            texture_layout,
            vertex_buffer,
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_handle: 0,
            _window: window,
        })
    }

    pub fn surface_size(&self) -> Resolution {
        Resolution::new(self.context.size.width, self.context.size.height)
    }

    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl GpuBackend for WgpuBackend {
    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramHandle, ShaderError> {
        let pipeline = QuadPipeline::new(
            &self.context.device,
            &self.texture_layout,
            self.context.surface_format,
            vertex_source,
            fragment_source,
        )?;
        let handle = ProgramHandle::new(self.next_handle());
        self.programs.insert(handle, pipeline);
        Ok(handle)
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        let pipeline = self.programs.get(&program)?;
        pipeline::reflect_location(&pipeline.vertex_source, "in", name)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        let pipeline = self.programs.get(&program)?;
        pipeline::reflect_location(&pipeline.fragment_source, "uniform", name)
    }

    fn create_texture(&mut self, params: TextureParams) -> TextureHandle {
        let handle = TextureHandle::new(self.next_handle());
        let label = format!("camera texture #{}", handle.raw());
        let slot = TextureSlot::new(&self.context.device, params, &label);
        tracing::trace!(texture = handle.raw(), params = ?slot.params(), "created texture");
        self.textures.insert(handle, slot);
        handle
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<()> {
        let max = self.context.max_texture_dimension;
        if width > max || height > max {
            bail!("frame {width}x{height} exceeds GPU texture limit {max}");
        }
        let slot = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| anyhow!("unknown texture handle {}", texture.raw()))?;
        slot.write(
            &self.context.device,
            &self.context.queue,
            &self.texture_layout,
            width,
            height,
            rgba,
        )
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.context.resize(PhysicalSize::new(width, height));
    }

    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> Result<()> {
        let pipeline = self
            .programs
            .get(&draw.program)
            .ok_or_else(|| anyhow!("unknown program handle {}", draw.program.raw()))?;
        let bind_group = self
            .textures
            .get(&draw.texture)
            .and_then(|slot| slot.bind_group());

        let vertices = QuadVertex::from_geometry(draw.geometry);
        self.context
            .queue
            .write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&vertices));

        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                bail!("surface was lost; reconfigured for the next draw");
            }
            Err(err) => bail!("failed to acquire next surface texture: {err}"),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("preview encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("preview pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            match bind_group {
                Some(bind_group) => {
                    pass.set_pipeline(&pipeline.pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                    pass.draw(0..QuadGeometry::VERTEX_COUNT, 0..1);
                }
                None => tracing::trace!(
                    texture = draw.texture.raw(),
                    "texture has no contents yet; presenting a cleared frame"
                ),
            }
        }

        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_none() {
            tracing::debug!(texture = texture.raw(), "delete of unknown texture ignored");
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            tracing::debug!(program = program.raw(), "delete of unknown program ignored");
        }
    }
}
