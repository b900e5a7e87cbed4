use image::RgbaImage;
use timeline::Vertex;
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::pipeline::{CompositeBackend, KeyframeDraw, StageKind, StagePlan};
use crate::types::Frame;
use crate::RenderError;

use super::context::{GpuContext, GpuPowerPreference};
use super::pipeline::{PipelineLayouts, StageProgram};
use super::target::{IntermediateTargets, OutputTarget, SampledTexture};
use super::uniforms::StageUniforms;

/// Clip-space quad intermediate passes draw with. Texture v runs downwards.
const PASS_QUAD: [Vertex; 6] = [
    Vertex { position: [-1.0, 1.0, 0.0], uv: [0.0, 0.0] },
    Vertex { position: [1.0, 1.0, 0.0], uv: [1.0, 0.0] },
    Vertex { position: [1.0, -1.0, 0.0], uv: [1.0, 1.0] },
    Vertex { position: [-1.0, 1.0, 0.0], uv: [0.0, 0.0] },
    Vertex { position: [1.0, -1.0, 0.0], uv: [1.0, 1.0] },
    Vertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 1.0] },
];

/// [`CompositeBackend`] on a headless wgpu device.
///
/// Every frame is recorded into one command encoder: a clear pass, then the
/// passes of each keyframe, then a copy into the readback buffer.
pub struct WgpuBackend {
    ctx: GpuContext,
    layouts: PipelineLayouts,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    pass_quad: wgpu::Buffer,
    output: OutputTarget,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    pub fn new(output_size: (u32, u32), power: GpuPowerPreference) -> Result<Self, RenderError> {
        let ctx = GpuContext::headless(power).map_err(|err| RenderError::Gpu(format!("{err:#}")))?;
        check_size(&ctx, output_size)?;
        debug!(adapter = ctx.adapter_name(), ?output_size, "initialising wgpu backend");

        let device = &ctx.device;
        let layouts = PipelineLayouts::new(device);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("keyreel image sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("keyreel stage uniforms"),
            size: std::mem::size_of::<StageUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("keyreel stage uniforms"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let pass_quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("keyreel pass quad"),
            contents: bytemuck::cast_slice(&PASS_QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let output = OutputTarget::new(device, output_size);

        Ok(Self {
            ctx,
            layouts,
            sampler,
            uniform_buffer,
            uniform_bind_group,
            pass_quad,
            output,
            encoder: None,
        })
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output.size
    }
}

fn check_size(ctx: &GpuContext, (width, height): (u32, u32)) -> Result<(), RenderError> {
    let max = ctx.max_texture_dimension();
    if width == 0 || height == 0 || width > max || height > max {
        return Err(RenderError::Gpu(format!(
            "texture size {width}x{height} outside device limits (max {max})"
        )));
    }
    Ok(())
}

/// Every stage but the last renders offscreen; only the last may target the
/// output.
fn check_stage_kinds(kinds: impl ExactSizeIterator<Item = StageKind>) -> Result<(), RenderError> {
    let last = kinds.len().saturating_sub(1);
    for (index, kind) in kinds.enumerate() {
        let expected = if index == last {
            StageKind::Final
        } else {
            StageKind::Intermediate
        };
        if kind != expected {
            return Err(RenderError::Gpu(format!(
                "stage {index} is {kind:?} but {expected:?} was expected"
            )));
        }
    }
    Ok(())
}

fn check_target_size(targets: (u32, u32), texture: (u32, u32)) -> Result<(), RenderError> {
    if targets != texture {
        return Err(RenderError::Gpu(format!(
            "intermediate targets are {}x{} but the source image is {}x{}",
            targets.0, targets.1, texture.0, texture.1
        )));
    }
    Ok(())
}

/// Uniforms change between passes of one encoder, so each update is staged
/// and copied in command order rather than written through the queue.
fn stage_uniforms(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    target: &wgpu::Buffer,
    uniforms: &StageUniforms,
) {
    let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("keyreel uniform staging"),
        contents: bytemuck::bytes_of(uniforms),
        usage: wgpu::BufferUsages::COPY_SRC,
    });
    encoder.copy_buffer_to_buffer(&staging, 0, target, 0, target.size());
}

impl CompositeBackend for WgpuBackend {
    type Program = StageProgram;
    type Texture = SampledTexture;
    type Targets = IntermediateTargets;

    fn compile_stage(&mut self, stage: &StagePlan) -> Result<StageProgram, RenderError> {
        StageProgram::new(&self.ctx.device, &self.layouts, stage)
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<SampledTexture, RenderError> {
        check_size(&self.ctx, (width, height))?;
        Ok(SampledTexture::new(
            &self.ctx.device,
            &self.layouts.image_layout,
            &self.sampler,
            (width, height),
            wgpu::TextureUsages::COPY_DST,
            "keyreel source image",
        ))
    }

    fn upload_texture(&mut self, texture: &SampledTexture, image: &RgbaImage) -> Result<(), RenderError> {
        texture.write_rgba(&self.ctx.queue, image.dimensions(), image.as_raw());
        Ok(())
    }

    fn create_targets(&mut self, width: u32, height: u32) -> Result<IntermediateTargets, RenderError> {
        check_size(&self.ctx, (width, height))?;
        Ok(IntermediateTargets::new(
            &self.ctx.device,
            &self.layouts.image_layout,
            &self.sampler,
            (width, height),
        ))
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<(), RenderError> {
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("keyreel frame"),
            });
        let [r, g, b, a] = clear_color.map(f64::from);
        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("keyreel clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.output.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.output.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.encoder = Some(encoder);
        Ok(())
    }

    fn draw(&mut self, draw: KeyframeDraw<'_, Self>) -> Result<(), RenderError> {
        let Some((final_program, passes)) = draw.programs.split_last() else {
            return Ok(());
        };
        check_stage_kinds(draw.programs.iter().map(|program| program.kind))?;
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| RenderError::Gpu("draw outside of a frame".into()))?;
        let device = &self.ctx.device;

        let mut input = &draw.texture.bind_group;
        if !passes.is_empty() {
            let targets = draw
                .targets
                .ok_or_else(|| RenderError::Gpu("multi-stage chain without targets".into()))?;
            check_target_size(targets.size, draw.texture_size)?;
            let load = if draw.uniforms.clear_intermediate {
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
            } else {
                wgpu::LoadOp::Load
            };
            for (index, program) in passes.iter().enumerate() {
                let target = &targets.targets[index % 2];
                stage_uniforms(
                    device,
                    encoder,
                    &self.uniform_buffer,
                    &StageUniforms::pass(&draw.uniforms),
                );
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("keyreel intermediate pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&program.pipeline);
                pass.set_bind_group(0, &self.uniform_bind_group, &[]);
                pass.set_bind_group(1, input, &[]);
                pass.set_vertex_buffer(0, self.pass_quad.slice(..));
                pass.draw(0..PASS_QUAD.len() as u32, 0..1);
                drop(pass);
                input = &target.bind_group;
            }
        }

        if draw.vertices.is_empty() {
            return Ok(());
        }
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("keyreel keyframe vertices"),
            contents: bytemuck::cast_slice(draw.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        stage_uniforms(
            device,
            encoder,
            &self.uniform_buffer,
            &StageUniforms::final_stage(&draw.uniforms),
        );
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("keyreel final pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.output.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.output.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&final_program.pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, input, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.draw(0..draw.vertices.len() as u32, 0..1);
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<Frame, RenderError> {
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| RenderError::Gpu("finish_frame without begin_frame".into()))?;
        self.output.encode_readback(&mut encoder);
        let submission = self.ctx.queue.submit(Some(encoder.finish()));
        self.output.read(&self.ctx.device, submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_kinds_must_end_in_one_final_stage() {
        use StageKind::{Final, Intermediate};
        assert!(check_stage_kinds([Final].into_iter()).is_ok());
        assert!(check_stage_kinds([Intermediate, Intermediate, Final].into_iter()).is_ok());
        assert!(check_stage_kinds([Intermediate].into_iter()).is_err());
        assert!(check_stage_kinds([Final, Final].into_iter()).is_err());
    }

    #[test]
    fn targets_must_match_the_source_image() {
        assert!(check_target_size((64, 32), (64, 32)).is_ok());
        assert!(check_target_size((64, 32), (32, 64)).is_err());
    }
}
