use bytemuck::{Pod, Zeroable};

use crate::pipeline::DrawUniforms;

/// Uniform block shared by every stage.
///
/// The layout must match `StageParams` in the GLSL prologue (std140: a mat4
/// followed by two floats, padded to 16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct StageUniforms {
    pub matrix: [[f32; 4]; 4],
    pub frame: f32,
    pub spectrum_level: f32,
    pub _padding: [f32; 2],
}

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

impl StageUniforms {
    pub fn final_stage(uniforms: &DrawUniforms) -> Self {
        Self {
            matrix: uniforms.matrix,
            frame: uniforms.frame,
            spectrum_level: uniforms.spectrum_level,
            _padding: [0.0; 2],
        }
    }

    /// Intermediate passes draw a quad already in clip space.
    pub fn pass(uniforms: &DrawUniforms) -> Self {
        Self {
            matrix: IDENTITY,
            ..Self::final_stage(uniforms)
        }
    }
}
