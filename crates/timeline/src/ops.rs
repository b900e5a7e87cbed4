//! Operator capability traits and the data they exchange.
//!
//! A keyframe owns one [`Source`], a chain of [`Action`]s and a chain of
//! [`Effect`]s. Each operator advertises what it can do through `Option`
//! accessors; a missing capability simply means the operator takes no part in
//! that stage.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

use crate::context::EngineContext;
use crate::keyframe::Keyframe;
use crate::state::AccumulatedState;

#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("{operator}: {message}")]
    Failed {
        operator: &'static str,
        message: String,
    },
    #[error("{operator}: i/o error on {path}: {source}")]
    Io {
        operator: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{operator}: failed to decode {path}: {source}")]
    Image {
        operator: &'static str,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl OperatorError {
    pub fn failed(operator: &'static str, message: impl Into<String>) -> Self {
        OperatorError::Failed {
            operator,
            message: message.into(),
        }
    }
}

pub trait Source: Send + Sync {
    fn name(&self) -> &'static str;

    fn image_source(&self) -> Option<&dyn ImageSource> {
        None
    }

    fn audio_source(&self) -> Option<&dyn AudioSource> {
        None
    }

    fn seekable(&self) -> Option<&dyn Seekable> {
        None
    }
}

pub trait ImageSource: Send + Sync {
    fn image(
        &self,
        ctx: &EngineContext,
        relative_frame: i64,
    ) -> Result<Arc<RgbaImage>, OperatorError>;
}

pub trait AudioSource: Send + Sync {
    /// Up to `len` samples starting at `relative_sample`. Shorter chunks are
    /// padded with silence by the mixer.
    fn audio(
        &self,
        ctx: &EngineContext,
        relative_sample: i64,
        len: usize,
    ) -> Result<AudioChunk, OperatorError>;
}

pub trait Seekable: Send + Sync {
    /// Reposition internal decode state so the next request for
    /// `relative_frame` is served without a cold start.
    fn seek(&self, ctx: &EngineContext, relative_frame: i64) -> Result<(), OperatorError>;
}

pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        state: AccumulatedState,
        keyframe: &Keyframe,
        ctx: &EngineContext,
        relative_frame: i64,
    ) -> AccumulatedState;

    fn seekable(&self) -> Option<&dyn Seekable> {
        None
    }
}

pub trait Effect: Send + Sync {
    fn name(&self) -> &'static str;

    fn compositor(&self) -> Option<&dyn Compositor> {
        None
    }

    fn sound_effect(&self) -> Option<&dyn SoundEffect> {
        None
    }

    fn seekable(&self) -> Option<&dyn Seekable> {
        None
    }
}

pub trait Compositor: Send + Sync {
    fn composite(
        &self,
        frame: CompositeFrame,
        ctx: &EngineContext,
        keyframe: &Keyframe,
        relative_frame: i64,
    ) -> Result<CompositeFrame, OperatorError>;
}

pub trait SoundEffect: Send + Sync {
    fn process(&self, chunk: AudioChunk, ctx: &EngineContext, relative_sample: i64) -> AudioChunk;
}

/// Which capabilities a keyframe's operators expose, resolved once when the
/// keyframe is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub image: bool,
    pub audio: bool,
    pub seek: bool,
    pub composite: bool,
    pub sound: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }
}

/// One piece of a fragment program.
///
/// `declarations` is top-level GLSL, `uv` runs with `vec2 pos` in scope before
/// the image is sampled, `color` runs with `vec4 color` in scope after. When
/// `pass_boundary` is set the current stage ends after this fragment and the
/// next fragment samples its output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderFragment {
    pub declarations: String,
    pub uv: String,
    pub color: String,
    pub pass_boundary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderChain {
    fragments: Vec<ShaderFragment>,
}

impl ShaderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: ShaderFragment) {
        self.fragments.push(fragment);
    }

    pub fn fragments(&self) -> &[ShaderFragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl FromIterator<ShaderFragment> for ShaderChain {
    fn from_iter<I: IntoIterator<Item = ShaderFragment>>(iter: I) -> Self {
        Self {
            fragments: iter.into_iter().collect(),
        }
    }
}

/// Working value folded through a keyframe's compositor effects.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub image: Arc<RgbaImage>,
    pub vertices: Vec<Vertex>,
    pub shaders: ShaderChain,
}

impl CompositeFrame {
    pub fn new(image: Arc<RgbaImage>) -> Self {
        Self {
            image,
            vertices: Vec::new(),
            shaders: ShaderChain::new(),
        }
    }
}

/// Planar audio: one `Vec` per channel, all the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioChunk {
    pub fn silent(channels: usize, len: usize, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; len]; channels.max(1)],
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Sample frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Multiply every sample by `gain(index)` where `index` counts frames
    /// from the start of the chunk.
    pub fn apply_gain(&mut self, gain: impl Fn(usize) -> f32) {
        for channel in &mut self.channels {
            for (index, sample) in channel.iter_mut().enumerate() {
                *sample *= gain(index);
            }
        }
    }
}
