//! Compositing, mixing and playback for keyreel timelines.
//!
//! ```text
//!   Timeline ──▶ compute_active_state ──▶ FrameCompositor ──▶ Frame
//!       ▲                │                       (wgpu)
//!       │                └──▶ SnapshotSlot ──▶ AudioFeed ──▶ cpal
//!   SeekCoordinator                               │
//!   (worker thread) ◀── Engine::seek              └──▶ SpectrumHistory
//! ```
//!
//! [`Engine`] owns everything that must stay on the render tick: the
//! timeline, the playback cursor and all GPU objects. The audio callback
//! reads the last published active state without blocking, and operator
//! seeks run on their own worker. [`export`] drives the same engine offline.

mod audio;
mod compile;
mod cursor;
mod engine;
mod export;
mod gpu;
mod pipeline;
mod projection;
mod seek;
mod types;

pub use audio::{
    list_output_devices, mix_sound_block, AudioBlock, AudioFeed, AudioOutput, AudioSnapshot,
    SnapshotSlot, SpectrumHistory, BLOCK_SIZE, HISTORY_SIZE,
};
pub use cursor::PlaybackCursor;
pub use engine::{Engine, PresentationSink, SeekMode, TickOutput};
pub use export::{
    ensure_parent_dir, export, is_ffmpeg_on_path, write_soundtrack, AudioInput, ExportError,
    ExportRequest, ExportSink, ExportSummary, FfmpegSink, InMemorySink, SinkConfig,
};
pub use gpu::{
    GpuContext, GpuPowerPreference, IntermediateTargets, SampledTexture, StageProgram,
    StageUniforms, WgpuBackend,
};
pub use pipeline::{
    CompositeBackend, CompositorStats, DrawUniforms, FrameCompositor, KeyframeDraw,
    KeyframeGpuCache, ShaderChainShape, StageKind, StagePlan,
};
pub use projection::camera_matrix;
pub use seek::{SeekCompletion, SeekCoordinator, SeekEvent, SeekFailure};
pub use types::{CameraParams, Frame, RendererConfig};

/// Failures that stop rendering.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Device, allocation or shader compilation failure.
    #[error("GPU error: {0}")]
    Gpu(String),
    #[error("worker error: {0}")]
    Worker(String),
}
