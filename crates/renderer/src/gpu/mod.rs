mod backend;
mod context;
mod pipeline;
mod target;
mod uniforms;

pub use backend::WgpuBackend;
pub use context::{GpuContext, GpuPowerPreference};
pub use pipeline::StageProgram;
pub use target::{IntermediateTargets, SampledTexture};
pub use uniforms::StageUniforms;
