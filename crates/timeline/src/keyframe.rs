use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::EngineContext;
use crate::ops::{
    Action, AudioChunk, AudioSource, Capabilities, CompositeFrame, Effect, ImageSource,
    OperatorError, Seekable, Source,
};
use crate::state::AccumulatedState;

static NEXT_KEYFRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique keyframe identity. Survives retiming and cloning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyframeId(u64);

impl KeyframeId {
    pub fn next() -> Self {
        KeyframeId(NEXT_KEYFRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for KeyframeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kf{}", self.0)
    }
}

/// A time-anchored bundle of operators. Cloning shares the operators.
#[derive(Clone)]
pub struct Keyframe {
    id: KeyframeId,
    time: i64,
    label: Option<String>,
    source: Arc<dyn Source>,
    actions: Vec<Arc<dyn Action>>,
    effects: Vec<Arc<dyn Effect>>,
    capabilities: Capabilities,
}

impl Keyframe {
    pub fn new(time: i64, source: Arc<dyn Source>) -> Self {
        let mut keyframe = Self {
            id: KeyframeId::next(),
            time,
            label: None,
            source,
            actions: Vec::new(),
            effects: Vec::new(),
            capabilities: Capabilities::default(),
        };
        keyframe.resolve_capabilities();
        keyframe
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.push(action);
        self.resolve_capabilities();
        self
    }

    pub fn with_effect(mut self, effect: Arc<dyn Effect>) -> Self {
        self.effects.push(effect);
        self.resolve_capabilities();
        self
    }

    pub(crate) fn set_time(&mut self, time: i64) {
        self.time = time;
    }

    fn resolve_capabilities(&mut self) {
        let source = self.source.as_ref();
        self.capabilities = Capabilities {
            image: source.image_source().is_some(),
            audio: source.audio_source().is_some(),
            seek: source.seekable().is_some()
                || self.actions.iter().any(|a| a.seekable().is_some())
                || self.effects.iter().any(|e| e.seekable().is_some()),
            composite: self.effects.iter().any(|e| e.compositor().is_some()),
            sound: self.effects.iter().any(|e| e.sound_effect().is_some()),
        };
    }

    pub fn id(&self) -> KeyframeId {
        self.id
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    pub fn actions(&self) -> &[Arc<dyn Action>] {
        &self.actions
    }

    pub fn effects(&self) -> &[Arc<dyn Effect>] {
        &self.effects
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn image_source(&self) -> Option<&dyn ImageSource> {
        if !self.capabilities.image {
            return None;
        }
        self.source.image_source()
    }

    pub fn audio_source(&self) -> Option<&dyn AudioSource> {
        if !self.capabilities.audio {
            return None;
        }
        self.source.audio_source()
    }

    /// Every seekable operator on this keyframe, named for logging.
    pub fn seek_targets(&self) -> Vec<(&'static str, &dyn Seekable)> {
        if !self.capabilities.seek {
            return Vec::new();
        }
        let mut targets = Vec::new();
        if let Some(seekable) = self.source.seekable() {
            targets.push((self.source.name(), seekable));
        }
        for action in &self.actions {
            if let Some(seekable) = action.seekable() {
                targets.push((action.name(), seekable));
            }
        }
        for effect in &self.effects {
            if let Some(seekable) = effect.seekable() {
                targets.push((effect.name(), seekable));
            }
        }
        targets
    }

    /// Thread `state` through this keyframe's actions in order.
    pub fn apply_actions(
        &self,
        mut state: AccumulatedState,
        ctx: &EngineContext,
        frame: i64,
    ) -> AccumulatedState {
        let relative_frame = frame - self.time;
        for action in &self.actions {
            state = action.apply(state, self, ctx, relative_frame);
        }
        state
    }

    /// Source image folded through the compositor effects. `None` when the
    /// source produces no image.
    pub fn composite(
        &self,
        ctx: &EngineContext,
        frame: i64,
    ) -> Result<Option<CompositeFrame>, OperatorError> {
        let Some(source) = self.image_source() else {
            return Ok(None);
        };
        let relative_frame = frame - self.time;
        let mut composite = CompositeFrame::new(source.image(ctx, relative_frame)?);
        if self.capabilities.composite {
            for effect in &self.effects {
                if let Some(compositor) = effect.compositor() {
                    composite = compositor.composite(composite, ctx, self, relative_frame)?;
                }
            }
        }
        Ok(Some(composite))
    }

    /// Audio contribution for the block starting at `absolute_sample`, after
    /// the sound effects. `None` when the source produces no audio.
    pub fn sound(
        &self,
        ctx: &EngineContext,
        absolute_sample: i64,
        len: usize,
    ) -> Result<Option<AudioChunk>, OperatorError> {
        let Some(source) = self.audio_source() else {
            return Ok(None);
        };
        let relative_sample = absolute_sample - ctx.sample_anchor(self.time);
        let mut chunk = source.audio(ctx, relative_sample, len)?;
        if self.capabilities.sound {
            for effect in &self.effects {
                if let Some(sound) = effect.sound_effect() {
                    chunk = sound.process(chunk, ctx, relative_sample);
                }
            }
        }
        Ok(Some(chunk))
    }
}

impl fmt::Debug for Keyframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyframe")
            .field("id", &self.id)
            .field("time", &self.time)
            .field("label", &self.label)
            .field("source", &self.source.name())
            .field(
                "actions",
                &self.actions.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field(
                "effects",
                &self.effects.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{GainEffect, QuadEffect, ShowAction, SolidSource, ToneSource};

    #[test]
    fn ids_are_unique_and_survive_clone() {
        let source: Arc<dyn Source> = Arc::new(SolidSource::new(2, 2, [0, 0, 0, 255]));
        let a = Keyframe::new(0, source.clone());
        let b = Keyframe::new(0, source);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn capabilities_follow_operators() {
        let image = Keyframe::new(0, Arc::new(SolidSource::new(2, 2, [0, 0, 0, 255])))
            .with_action(Arc::new(ShowAction { layer: 0 }))
            .with_effect(Arc::new(QuadEffect::default()));
        let caps = image.capabilities();
        assert!(caps.image && caps.composite);
        assert!(!caps.audio && !caps.sound && !caps.seek);

        let tone = Keyframe::new(0, Arc::new(ToneSource::new(440.0, 0.5)))
            .with_effect(Arc::new(GainEffect { amount: 0.5 }));
        let caps = tone.capabilities();
        assert!(caps.audio && caps.sound);
        assert!(!caps.image && !caps.composite);
        assert!(tone.image_source().is_none());
    }

    #[test]
    fn composite_without_image_is_none() {
        let tone = Keyframe::new(0, Arc::new(ToneSource::new(440.0, 0.5)));
        let frame = tone.composite(&EngineContext::default(), 10).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn sound_is_relative_to_keyframe_anchor() {
        let ctx = EngineContext::default();
        let tone = Keyframe::new(60, Arc::new(ToneSource::new(1_000.0, 1.0)));
        // 60 frames at 60 fps anchors at sample 48000; the first sample of a
        // sine is zero.
        let chunk = tone.sound(&ctx, 48_000, 8).unwrap().unwrap();
        assert_eq!(chunk.len(), 8);
        assert_eq!(chunk.channels[0][0], 0.0);
        assert!(chunk.channels[0][1] > 0.0);
    }
}
