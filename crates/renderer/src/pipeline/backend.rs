use image::RgbaImage;
use timeline::Vertex;

use crate::types::Frame;
use crate::RenderError;

use super::shape::StagePlan;

/// GPU operations the compositor needs. The wgpu implementation lives in
/// [`crate::gpu`]; tests substitute a recording backend.
pub trait CompositeBackend {
    /// A compiled stage program.
    type Program;
    /// A sampled texture holding a source image.
    type Texture;
    /// The pair of intermediate render targets a multi-stage chain
    /// ping-pongs between.
    type Targets;

    fn compile_stage(&mut self, stage: &StagePlan) -> Result<Self::Program, RenderError>;

    fn create_texture(&mut self, width: u32, height: u32) -> Result<Self::Texture, RenderError>;

    /// Overwrite the whole texture. `image` has the texture's dimensions.
    fn upload_texture(&mut self, texture: &Self::Texture, image: &RgbaImage)
        -> Result<(), RenderError>;

    fn create_targets(&mut self, width: u32, height: u32) -> Result<Self::Targets, RenderError>;

    /// Start a new output frame cleared to `clear_color`.
    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<(), RenderError>;

    /// Record every stage of one keyframe.
    fn draw(&mut self, draw: KeyframeDraw<'_, Self>) -> Result<(), RenderError>;

    /// Submit the frame and read the output target back.
    fn finish_frame(&mut self) -> Result<Frame, RenderError>;
}

/// Everything needed to draw one keyframe. `programs` is in stage order; the
/// last one is the final stage. `targets` is present whenever there is more
/// than one program.
pub struct KeyframeDraw<'a, B: CompositeBackend + ?Sized> {
    pub programs: &'a [B::Program],
    pub texture: &'a B::Texture,
    pub texture_size: (u32, u32),
    pub targets: Option<&'a B::Targets>,
    pub vertices: &'a [Vertex],
    pub uniforms: DrawUniforms,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawUniforms {
    /// Column-major camera matrix for the final stage.
    pub matrix: [[f32; 4]; 4],
    /// Frame relative to the keyframe's start.
    pub frame: f32,
    pub spectrum_level: f32,
    pub clear_intermediate: bool,
}
