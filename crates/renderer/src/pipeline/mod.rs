//! Backend-independent compositing: stage planning, per-keyframe caches and
//! the per-frame draw loop.

mod backend;
mod compositor;
#[cfg(test)]
pub(crate) mod recording;
mod shape;

pub use backend::{CompositeBackend, DrawUniforms, KeyframeDraw};
pub use compositor::{CompositorStats, FrameCompositor, KeyframeGpuCache};
pub use shape::{ShaderChainShape, StageKind, StagePlan};
