use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::pipeline::{StageKind, StagePlan};

/// Compiles the vertex shader shared by every stage of `kind`.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device, kind: StageKind) -> wgpu::ShaderModule {
    let (label, source) = match kind {
        StageKind::Intermediate => ("keyreel pass vertex", PASS_VERTEX_GLSL),
        StageKind::Final => ("keyreel final vertex", FINAL_VERTEX_GLSL),
    };
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// Assembles and compiles the fragment program for one stage. Errors surface
/// through the device error scope the caller pushed.
pub(crate) fn compile_stage_shader(device: &wgpu::Device, stage: &StagePlan) -> wgpu::ShaderModule {
    let source = stage_fragment_source(stage);
    tracing::trace!(kind = ?stage.kind, fragments = stage.fragments.len(), "compiling stage");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("keyreel stage fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Produces a self-contained GLSL fragment shader for one stage.
///
/// Every fragment's `declarations` go to the top level after [`HEADER`].
/// `main` then runs all `uv` snippets against `pos`, samples `image`, runs all
/// `color` snippets against `color`, and writes the result.
pub(crate) fn stage_fragment_source(stage: &StagePlan) -> String {
    let mut declarations = String::new();
    let mut uv = String::new();
    let mut color = String::new();
    for fragment in &stage.fragments {
        push_snippet(&mut declarations, &fragment.declarations, "");
        push_snippet(&mut uv, &fragment.uv, "    ");
        push_snippet(&mut color, &fragment.color, "    ");
    }

    format!(
        "{HEADER}\n{declarations}\nvoid main() {{\n    vec2 pos = v_uv;\n{uv}    vec4 color = texture(image, pos);\n{color}    out_color = color;\n}}\n"
    )
}

fn push_snippet(out: &mut String, snippet: &str, indent: &str) {
    for line in snippet.lines() {
        out.push_str(indent);
        out.push_str(line);
        out.push('\n');
    }
}

/// GLSL prologue shared by every stage.
///
/// The uniform block layout must match [`StageUniforms`](crate::gpu::StageUniforms).
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform StageParams {
    mat4 _matrix;
    float _frame;
    float _spectrum_level;
    vec2 _padding;
} params;

#define matrix params._matrix
#define frame params._frame
#define spectrum_level params._spectrum_level

layout(set = 1, binding = 0) uniform texture2D keyreel_image_texture;
layout(set = 1, binding = 1) uniform sampler keyreel_image_sampler;

#define image sampler2D(keyreel_image_texture, keyreel_image_sampler)
";

/// Positions the keyframe's vertices with the camera matrix.
const FINAL_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec2 a_uv;
layout(location = 0) out vec2 v_uv;

layout(std140, set = 0, binding = 0) uniform StageParams {
    mat4 matrix;
    float frame;
    float spectrum_level;
    vec2 _padding;
} params;

void main() {
    v_uv = a_uv;
    gl_Position = params.matrix * vec4(a_position, 1.0);
}
";

/// Passes the full-target quad through untouched.
const PASS_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec2 a_uv;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = a_uv;
    gl_Position = vec4(a_position, 1.0);
}
";
