//! Keyframes, the time-ordered timeline and the state accumulator.
//!
//! The crate has no GPU or audio-device code. Renderers consume the
//! [`AccumulatedState`] produced by [`compute_active_state`] and drive the
//! operator capabilities declared in [`ops`].

mod build;
pub mod builtin;
mod context;
mod keyframe;
pub mod ops;
mod state;
mod timeline;

pub use build::{action_from_spec, effect_from_spec, keyframe_from_spec, source_from_spec};
pub use context::{EngineContext, FrameTime, TICKS_PER_SECOND};
pub use keyframe::{Keyframe, KeyframeId};
pub use ops::{
    AudioChunk, Capabilities, CompositeFrame, OperatorError, ShaderChain, ShaderFragment, Vertex,
};
pub use state::{compute_active_state, AccumulatedState, ActiveEntry};
pub use timeline::Timeline;

#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("keyframe {0} is already in the timeline")]
    DuplicateKeyframe(KeyframeId),
    #[error("keyframe {0} is not in the timeline")]
    UnknownKeyframe(KeyframeId),
    #[error("index {index} is out of range for a timeline of {len} keyframes")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("failed to build keyframe '{keyframe}': {source}")]
    Build {
        keyframe: String,
        #[source]
        source: OperatorError,
    },
}
