use timeline::Vertex;

use crate::compile::{compile_stage_shader, compile_vertex_shader};
use crate::pipeline::{StageKind, StagePlan};
use crate::RenderError;

use super::target::{DEPTH_FORMAT, TARGET_FORMAT};

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

pub(crate) fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

/// Layouts and modules shared by every stage program.
pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub image_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pass_vertex: wgpu::ShaderModule,
    final_vertex: wgpu::ShaderModule,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stage uniform layout"),
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
        });

        let image_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stage image layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
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
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("stage pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &image_layout],
            push_constant_ranges: &[],
        });

        Self {
            pass_vertex: compile_vertex_shader(device, StageKind::Intermediate),
            final_vertex: compile_vertex_shader(device, StageKind::Final),
            uniform_layout,
            image_layout,
            pipeline_layout,
        }
    }
}

/// One compiled stage of a keyframe's shader chain.
pub struct StageProgram {
    pub(crate) kind: StageKind,
    pub(crate) pipeline: wgpu::RenderPipeline,
}

impl StageProgram {
    /// Builds the pipeline for `stage`. Intermediate stages overwrite an
    /// offscreen target; the final stage depth-tests and alpha-blends into the
    /// output.
    pub(crate) fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        stage: &StagePlan,
    ) -> Result<Self, RenderError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let fragment_module = compile_stage_shader(device, stage);
        let (vertex_module, blend, depth_stencil, label) = match stage.kind {
            StageKind::Intermediate => (
                &layouts.pass_vertex,
                wgpu::BlendState::REPLACE,
                None,
                "keyreel intermediate stage",
            ),
            StageKind::Final => (
                &layouts.final_vertex,
                wgpu::BlendState::ALPHA_BLENDING,
                Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                "keyreel final stage",
            ),
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&layouts.pipeline_layout),
            vertex: wgpu::VertexState {
                module: vertex_module,
                entry_point: Some("main"),
                buffers: &[vertex_buffer_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::Gpu(format!("failed to build {label}: {error}")));
        }

        Ok(Self {
            kind: stage.kind,
            pipeline,
        })
    }
}
