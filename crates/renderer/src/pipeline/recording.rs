//! In-memory backend that records what the compositor asked for.

use image::RgbaImage;

use crate::types::Frame;
use crate::RenderError;

use super::backend::{CompositeBackend, KeyframeDraw};
use super::shape::{StageKind, StagePlan};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedDraw {
    pub stages: usize,
    pub vertices: usize,
    pub has_targets: bool,
    pub frame: f32,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    pub compiled: Vec<StageKind>,
    pub textures: Vec<(u32, u32)>,
    pub targets: Vec<(u32, u32)>,
    pub uploads: usize,
    pub draws: Vec<RecordedDraw>,
    pub frames: usize,
    pub fail_compile: bool,
    pub clear_color: [f32; 4],
}

impl CompositeBackend for RecordingBackend {
    type Program = StageKind;
    type Texture = (u32, u32);
    type Targets = (u32, u32);

    fn compile_stage(&mut self, stage: &StagePlan) -> Result<StageKind, RenderError> {
        if self.fail_compile {
            return Err(RenderError::Gpu("recorded compile failure".into()));
        }
        self.compiled.push(stage.kind);
        Ok(stage.kind)
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<(u32, u32), RenderError> {
        self.textures.push((width, height));
        Ok((width, height))
    }

    fn upload_texture(&mut self, texture: &(u32, u32), image: &RgbaImage) -> Result<(), RenderError> {
        assert_eq!(*texture, image.dimensions(), "upload must match texture size");
        self.uploads += 1;
        Ok(())
    }

    fn create_targets(&mut self, width: u32, height: u32) -> Result<(u32, u32), RenderError> {
        self.targets.push((width, height));
        Ok((width, height))
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<(), RenderError> {
        self.clear_color = clear_color;
        Ok(())
    }

    fn draw(&mut self, draw: KeyframeDraw<'_, Self>) -> Result<(), RenderError> {
        assert_eq!(
            draw.programs.last(),
            Some(&StageKind::Final),
            "last program must be the final stage"
        );
        self.draws.push(RecordedDraw {
            stages: draw.programs.len(),
            vertices: draw.vertices.len(),
            has_targets: draw.targets.is_some(),
            frame: draw.uniforms.frame,
        });
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<Frame, RenderError> {
        self.frames += 1;
        Ok(Frame::solid(4, 4, self.clear_color))
    }
}
