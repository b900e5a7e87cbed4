use crate::context::EngineContext;
use crate::keyframe::Keyframe;
use crate::ops::{
    AudioChunk, CompositeFrame, Compositor, Effect, OperatorError, ShaderFragment, SoundEffect,
    Vertex,
};

/// Places the image on a rectangle in output pixel space.
///
/// `width`/`height` default to the image size and are scaled by the relative
/// percentages. The quad rotates about its centre.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadEffect {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub rotation: f32,
    pub relative_width: f32,
    pub relative_height: f32,
}

impl Default for QuadEffect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            width: None,
            height: None,
            rotation: 0.0,
            relative_width: 100.0,
            relative_height: 100.0,
        }
    }
}

impl QuadEffect {
    fn vertices(&self, image_width: u32, image_height: u32) -> [Vertex; 6] {
        let width = self.width.unwrap_or(image_width as f32) * self.relative_width / 100.0;
        let height = self.height.unwrap_or(image_height as f32) * self.relative_height / 100.0;
        let (cx, cy) = (self.x + width / 2.0, self.y + height / 2.0);
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let corner = |dx: f32, dy: f32, uv: [f32; 2]| {
            let rx = dx * cos - dy * sin;
            let ry = dx * sin + dy * cos;
            Vertex::new([cx + rx, cy + ry, self.z], uv)
        };
        let (hw, hh) = (width / 2.0, height / 2.0);
        let top_left = corner(-hw, -hh, [0.0, 0.0]);
        let top_right = corner(hw, -hh, [1.0, 0.0]);
        let bottom_right = corner(hw, hh, [1.0, 1.0]);
        let bottom_left = corner(-hw, hh, [0.0, 1.0]);
        [
            top_left,
            top_right,
            bottom_right,
            top_left,
            bottom_right,
            bottom_left,
        ]
    }
}

impl Effect for QuadEffect {
    fn name(&self) -> &'static str {
        "quad"
    }

    fn compositor(&self) -> Option<&dyn Compositor> {
        Some(self)
    }
}

impl Compositor for QuadEffect {
    fn composite(
        &self,
        mut frame: CompositeFrame,
        _ctx: &EngineContext,
        _keyframe: &Keyframe,
        _relative_frame: i64,
    ) -> Result<CompositeFrame, OperatorError> {
        let (width, height) = frame.image.dimensions();
        frame.vertices.extend(self.vertices(width, height));
        // A bare sampling fragment so the quad draws without other shaders.
        if frame.shaders.is_empty() {
            frame.shaders.push(ShaderFragment::default());
        }
        Ok(frame)
    }
}

/// Appends a user fragment to the shader chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderEffect {
    pub fragment: ShaderFragment,
}

impl Effect for ShaderEffect {
    fn name(&self) -> &'static str {
        "shader"
    }

    fn compositor(&self) -> Option<&dyn Compositor> {
        Some(self)
    }
}

impl Compositor for ShaderEffect {
    fn composite(
        &self,
        mut frame: CompositeFrame,
        _ctx: &EngineContext,
        _keyframe: &Keyframe,
        _relative_frame: i64,
    ) -> Result<CompositeFrame, OperatorError> {
        frame.shaders.push(self.fragment.clone());
        Ok(frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainEffect {
    pub amount: f32,
}

impl Effect for GainEffect {
    fn name(&self) -> &'static str {
        "gain"
    }

    fn sound_effect(&self) -> Option<&dyn SoundEffect> {
        Some(self)
    }
}

impl SoundEffect for GainEffect {
    fn process(&self, mut chunk: AudioChunk, _ctx: &EngineContext, _relative_sample: i64) -> AudioChunk {
        chunk.apply_gain(|_| self.amount);
        chunk
    }
}

/// Linear ramp from silence over the first `frames` output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeInEffect {
    pub frames: u32,
}

impl Effect for FadeInEffect {
    fn name(&self) -> &'static str {
        "fade_in"
    }

    fn sound_effect(&self) -> Option<&dyn SoundEffect> {
        Some(self)
    }
}

impl SoundEffect for FadeInEffect {
    fn process(&self, mut chunk: AudioChunk, ctx: &EngineContext, relative_sample: i64) -> AudioChunk {
        let ramp = ctx.sample_anchor(self.frames as i64).max(1) as f32;
        if relative_sample as f32 >= ramp {
            return chunk;
        }
        chunk.apply_gain(|index| ((relative_sample + index as i64) as f32 / ramp).clamp(0.0, 1.0));
        chunk
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::RgbaImage;

    use super::*;
    use crate::builtin::SolidSource;

    fn frame(width: u32, height: u32) -> CompositeFrame {
        CompositeFrame::new(Arc::new(RgbaImage::new(width, height)))
    }

    fn keyframe() -> Keyframe {
        Keyframe::new(0, Arc::new(SolidSource::new(1, 1, [0; 4])))
    }

    #[test]
    fn quad_defaults_to_image_size() {
        let ctx = EngineContext::default();
        let out = QuadEffect::default()
            .composite(frame(640, 360), &ctx, &keyframe(), 0)
            .unwrap();
        assert_eq!(out.vertices.len(), 6);
        assert_eq!(out.vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(out.vertices[2].position, [640.0, 360.0, 0.0]);
        assert_eq!(out.vertices[2].uv, [1.0, 1.0]);
        assert_eq!(out.shaders.len(), 1);
    }

    #[test]
    fn quad_scales_and_keeps_existing_shaders() {
        let ctx = EngineContext::default();
        let effect = QuadEffect {
            x: 10.0,
            y: 20.0,
            width: Some(200.0),
            height: Some(100.0),
            relative_width: 50.0,
            relative_height: 50.0,
            ..QuadEffect::default()
        };
        let mut input = frame(8, 8);
        input.shaders.push(ShaderFragment {
            color: "color.a = 0.5;".into(),
            ..ShaderFragment::default()
        });
        let out = effect.composite(input, &ctx, &keyframe(), 0).unwrap();
        assert_eq!(out.vertices[0].position, [10.0, 20.0, 0.0]);
        assert_eq!(out.vertices[2].position, [110.0, 70.0, 0.0]);
        assert_eq!(out.shaders.len(), 1);
    }

    #[test]
    fn quad_rotation_is_about_centre() {
        let effect = QuadEffect {
            width: Some(2.0),
            height: Some(2.0),
            rotation: 90.0,
            ..QuadEffect::default()
        };
        let vertices = effect.vertices(1, 1);
        let top_left = vertices[0].position;
        assert!((top_left[0] - 2.0).abs() < 1e-5);
        assert!(top_left[1].abs() < 1e-5);
    }

    #[test]
    fn fade_in_ramps_then_passes_through() {
        let ctx = EngineContext::default();
        let fade = FadeInEffect { frames: 1 };
        let chunk = AudioChunk::mono(vec![1.0; 4], ctx.sample_rate);
        let faded = fade.process(chunk.clone(), &ctx, 400);
        assert_eq!(faded.channels[0][0], 0.5);

        let after = fade.process(chunk.clone(), &ctx, 800);
        assert_eq!(after, chunk);
    }

    #[test]
    fn gain_scales_all_channels() {
        let ctx = EngineContext::default();
        let chunk = AudioChunk {
            sample_rate: ctx.sample_rate,
            channels: vec![vec![1.0, 2.0], vec![-1.0, -2.0]],
        };
        let out = GainEffect { amount: 0.5 }.process(chunk, &ctx, 0);
        assert_eq!(out.channels, vec![vec![0.5, 1.0], vec![-0.5, -1.0]]);
    }
}
