use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use wgpu::naga;

use super::{QuadGeometry, ShaderError, ShaderStage};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl QuadVertex {
    pub(crate) fn from_geometry(geometry: &QuadGeometry) -> [QuadVertex; 4] {
        std::array::from_fn(|index| QuadVertex {
            position: [
                geometry.positions[index * 3],
                geometry.positions[index * 3 + 1],
                geometry.positions[index * 3 + 2],
            ],
            tex_coord: [geometry.tex_coords[index * 2], geometry.tex_coords[index * 2 + 1]],
        })
    }
}

/// Reads `layout(location = N)` or `layout(binding = N)` for the declaration of
/// `name` with the given storage qualifier (`in`, `out`, `uniform`).
pub(crate) fn reflect_location(source: &str, qualifier: &str, name: &str) -> Option<u32> {
    source.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("layout(")?;
        let (layout, declaration) = rest.split_once(')')?;
        let mut tokens = declaration.trim().trim_end_matches(';').split_whitespace();
        if tokens.next()? != qualifier || tokens.last()? != name {
            return None;
        }
        layout.split(',').find_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            match key.trim() {
                "location" | "binding" => value.trim().parse().ok(),
                _ => None,
            }
        })
    })
}

pub(crate) fn texture_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("preview texture layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// A linked preview program: both stages baked into one render pipeline.
pub(crate) struct QuadPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub vertex_source: String,
    pub fragment_source: String,
}

impl QuadPipeline {
    pub fn new(
        device: &wgpu::Device,
        texture_layout: &wgpu::BindGroupLayout,
        surface_format: wgpu::TextureFormat,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let vertex_module = compile_stage(device, ShaderStage::Vertex, vertex_source)?;
        let fragment_module = compile_stage(device, ShaderStage::Fragment, fragment_source)?;

        let position = reflect_location(vertex_source, "in", crate::compile::POSITION_ATTRIBUTE)
            .ok_or_else(|| ShaderError::Link("vertex shader declares no position input".into()))?;
        let tex_coord = reflect_location(vertex_source, "in", crate::compile::TEX_COORD_ATTRIBUTE)
            .ok_or_else(|| {
                ShaderError::Link("vertex shader declares no texture coordinate input".into())
            })?;
        let attributes = [
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x3,
                offset: 0,
                shader_location: position,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                shader_location: tex_coord,
            },
        ];

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("preview pipeline layout"),
            bind_group_layouts: &[texture_layout],
            push_constant_ranges: &[],
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("preview pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
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
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::Link(error.to_string()));
        }

        Ok(Self {
            pipeline,
            vertex_source: vertex_source.to_owned(),
            fragment_source: fragment_source.to_owned(),
        })
    }
}

fn compile_stage(
    device: &wgpu::Device,
    stage: ShaderStage,
    source: &str,
) -> Result<wgpu::ShaderModule, ShaderError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(match stage {
            ShaderStage::Vertex => "preview vertex",
            ShaderStage::Fragment => "preview fragment",
        }),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_owned()),
            stage: naga_stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(ShaderError::Compile {
            stage,
            log: error.to_string(),
        }),
        None => Ok(module),
    }
}
