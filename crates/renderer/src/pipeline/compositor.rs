use std::collections::{HashMap, HashSet};

use timeline::{AccumulatedState, CompositeFrame, EngineContext, Keyframe, KeyframeId};
use tracing::{debug, warn};

use crate::projection::camera_matrix;
use crate::types::{Frame, RendererConfig};
use crate::RenderError;

use super::backend::{CompositeBackend, DrawUniforms, KeyframeDraw};
use super::shape::ShaderChainShape;

/// GPU state kept for one keyframe between ticks.
pub struct KeyframeGpuCache<B: CompositeBackend> {
    shape: Option<ShaderChainShape>,
    programs: Vec<B::Program>,
    texture: Option<(B::Texture, (u32, u32))>,
    targets: Option<B::Targets>,
}

impl<B: CompositeBackend> Default for KeyframeGpuCache<B> {
    fn default() -> Self {
        Self {
            shape: None,
            programs: Vec::new(),
            texture: None,
            targets: None,
        }
    }
}

impl<B: CompositeBackend> KeyframeGpuCache<B> {
    pub fn shape(&self) -> Option<&ShaderChainShape> {
        self.shape.as_ref()
    }

    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.texture.as_ref().map(|(_, size)| *size)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }
}

/// Running totals, mostly for tests and debug logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorStats {
    pub frames: u64,
    pub draws: u64,
    pub programs_compiled: u64,
    pub textures_allocated: u64,
    pub texture_uploads: u64,
    pub targets_allocated: u64,
    pub skipped: u64,
}

/// Draws an accumulated state into one output frame, keeping per-keyframe
/// programs and textures alive across ticks.
pub struct FrameCompositor<B: CompositeBackend> {
    backend: B,
    caches: HashMap<KeyframeId, KeyframeGpuCache<B>>,
    clear_color: [f32; 4],
    clear_intermediate: bool,
    matrix: [[f32; 4]; 4],
    stats: CompositorStats,
}

impl<B: CompositeBackend> FrameCompositor<B> {
    pub fn new(backend: B, config: &RendererConfig) -> Self {
        Self {
            backend,
            caches: HashMap::new(),
            clear_color: config.clear_color,
            clear_intermediate: config.clear_intermediate,
            matrix: camera_matrix(&config.camera, config.output_size).to_cols_array_2d(),
            stats: CompositorStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> CompositorStats {
        self.stats
    }

    pub fn cache(&self, id: KeyframeId) -> Option<&KeyframeGpuCache<B>> {
        self.caches.get(&id)
    }

    pub fn cached_keyframes(&self) -> usize {
        self.caches.len()
    }

    /// Forget everything cached for `id`; the next draw rebuilds it.
    pub fn invalidate(&mut self, id: KeyframeId) {
        if self.caches.remove(&id).is_some() {
            debug!(keyframe = %id, "invalidated keyframe GPU cache");
        }
    }

    /// Release caches of keyframes not in `ids`.
    pub fn retain(&mut self, ids: impl IntoIterator<Item = KeyframeId>) {
        let keep: HashSet<KeyframeId> = ids.into_iter().collect();
        let before = self.caches.len();
        self.caches.retain(|id, _| keep.contains(id));
        let released = before - self.caches.len();
        if released > 0 {
            debug!(released, "released keyframe GPU caches");
        }
    }

    /// Composite every entry of `state` in order and read the result back.
    pub fn render(
        &mut self,
        state: &AccumulatedState,
        ctx: &EngineContext,
        frame: i64,
    ) -> Result<Frame, RenderError> {
        self.backend.begin_frame(self.clear_color)?;
        for entry in state {
            self.draw_keyframe(&entry.keyframe, ctx, frame)?;
        }
        let output = self.backend.finish_frame()?;
        self.stats.frames += 1;
        Ok(output)
    }

    fn draw_keyframe(
        &mut self,
        keyframe: &Keyframe,
        ctx: &EngineContext,
        frame: i64,
    ) -> Result<(), RenderError> {
        let composite = match keyframe.composite(ctx, frame) {
            Ok(Some(composite)) => composite,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(keyframe = %keyframe.id(), error = %err, "skipping keyframe this frame");
                self.stats.skipped += 1;
                return Ok(());
            }
        };
        if composite.shaders.is_empty() {
            return Ok(());
        }

        let CompositeFrame {
            image,
            vertices,
            shaders,
        } = composite;
        let shape = ShaderChainShape::new(&shaders);
        let size = image.dimensions();
        let cache = self.caches.entry(keyframe.id()).or_default();

        if cache.shape.as_ref() != Some(&shape) {
            let programs = shape
                .stages()
                .iter()
                .map(|stage| self.backend.compile_stage(stage))
                .collect::<Result<Vec<_>, _>>()?;
            self.stats.programs_compiled += programs.len() as u64;
            debug!(
                keyframe = %keyframe.id(),
                stages = programs.len(),
                "rebuilt keyframe programs"
            );
            cache.programs = programs;
            cache.shape = Some(shape);
        }

        let needs_targets = cache.programs.len() > 1;
        if cache.texture.as_ref().map(|(_, s)| *s) != Some(size) {
            let texture = self.backend.create_texture(size.0, size.1)?;
            self.stats.textures_allocated += 1;
            cache.texture = Some((texture, size));
            cache.targets = None;
        }
        if !needs_targets {
            cache.targets = None;
        } else if cache.targets.is_none() {
            cache.targets = Some(self.backend.create_targets(size.0, size.1)?);
            self.stats.targets_allocated += 1;
        }

        let Some((texture, _)) = cache.texture.as_ref() else {
            return Ok(());
        };
        self.backend.upload_texture(texture, &image)?;
        self.stats.texture_uploads += 1;

        self.backend.draw(KeyframeDraw {
            programs: &cache.programs,
            texture,
            texture_size: size,
            targets: cache.targets.as_ref(),
            vertices: &vertices,
            uniforms: DrawUniforms {
                matrix: self.matrix,
                frame: (frame - keyframe.time()) as f32,
                spectrum_level: ctx.spectrum_level,
                clear_intermediate: self.clear_intermediate,
            },
        })?;
        self.stats.draws += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::RgbaImage;
    use timeline::builtin::{QuadEffect, ShaderEffect, ShowAction, SolidSource, ToneSource};
    use timeline::ops::{ImageSource, Source};
    use timeline::{compute_active_state, OperatorError, ShaderFragment, Timeline};

    use super::*;
    use crate::pipeline::recording::RecordingBackend;
    use crate::pipeline::StageKind;

    fn compositor() -> FrameCompositor<RecordingBackend> {
        FrameCompositor::new(RecordingBackend::default(), &RendererConfig::default())
    }

    fn visible(time: i64, size: u32) -> Keyframe {
        Keyframe::new(time, Arc::new(SolidSource::new(size, size, [255; 4])))
            .with_action(Arc::new(ShowAction { layer: 0 }))
            .with_effect(Arc::new(QuadEffect::default()))
    }

    fn shader(color: &str, new_pass: bool) -> Arc<ShaderEffect> {
        Arc::new(ShaderEffect {
            fragment: ShaderFragment {
                color: color.into(),
                pass_boundary: new_pass,
                ..ShaderFragment::default()
            },
        })
    }

    fn state_of(keyframes: Vec<Keyframe>, frame: i64) -> AccumulatedState {
        let mut timeline = Timeline::new();
        for keyframe in keyframes {
            timeline.insert(keyframe).unwrap();
        }
        compute_active_state(&mut timeline, frame, &EngineContext::default())
    }

    #[test]
    fn empty_shader_chain_draws_and_allocates_nothing() {
        let mut compositor = compositor();
        // An image source with no compositor effects has no shaders.
        let bare = Keyframe::new(0, Arc::new(SolidSource::new(8, 8, [255; 4])))
            .with_action(Arc::new(ShowAction { layer: 0 }));
        let state = state_of(vec![bare.clone()], 0);
        compositor
            .render(&state, &EngineContext::default(), 0)
            .unwrap();

        let backend = compositor.backend();
        assert!(backend.draws.is_empty());
        assert!(backend.compiled.is_empty());
        assert!(backend.textures.is_empty());
        assert!(compositor.cache(bare.id()).is_none());
        assert_eq!(compositor.stats().frames, 1);
    }

    #[test]
    fn audio_only_keyframe_is_skipped() {
        let mut compositor = compositor();
        let tone = Keyframe::new(0, Arc::new(ToneSource::new(440.0, 0.5)))
            .with_action(Arc::new(ShowAction { layer: 0 }))
            .with_effect(Arc::new(QuadEffect::default()));
        let state = state_of(vec![tone], 0);
        compositor
            .render(&state, &EngineContext::default(), 0)
            .unwrap();
        assert!(compositor.backend().draws.is_empty());
    }

    #[test]
    fn identical_chains_compile_once() {
        let mut compositor = compositor();
        let keyframe = visible(0, 16).with_effect(shader("color.r = 1.0;", false));
        let state = state_of(vec![keyframe.clone()], 0);
        let ctx = EngineContext::default();

        for frame in 0..5 {
            compositor.render(&state, &ctx, frame).unwrap();
        }

        let backend = compositor.backend();
        assert_eq!(backend.compiled, vec![StageKind::Final]);
        assert_eq!(backend.textures, vec![(16, 16)]);
        assert_eq!(backend.uploads, 5);
        assert_eq!(backend.draws.len(), 5);
        assert_eq!(backend.draws[4].frame, 4.0);
        assert_eq!(compositor.stats().programs_compiled, 1);
    }

    #[test]
    fn shape_change_recompiles_and_allocates_targets() {
        let mut compositor = compositor();
        let ctx = EngineContext::default();

        let single = visible(0, 16);
        compositor
            .render(&state_of(vec![single.clone()], 0), &ctx, 0)
            .unwrap();
        assert_eq!(compositor.backend().compiled.len(), 1);
        assert!(compositor.backend().targets.is_empty());

        // Same identity, new shape: a pass boundary splits it into two stages.
        let multi = single
            .clone()
            .with_effect(shader("color.g = 0.0;", true))
            .with_effect(shader("color.b = 0.0;", false));
        compositor
            .render(&state_of(vec![multi.clone()], 0), &ctx, 1)
            .unwrap();

        let backend = compositor.backend();
        assert_eq!(
            backend.compiled,
            vec![StageKind::Final, StageKind::Intermediate, StageKind::Final]
        );
        assert_eq!(backend.targets, vec![(16, 16)]);
        assert_eq!(backend.textures.len(), 1);
        let last = backend.draws.last().unwrap();
        assert_eq!(last.stages, 2);
        assert!(last.has_targets);
        assert_eq!(compositor.cache(multi.id()).map(|c| c.program_count()), Some(2));
    }

    /// Solid image that grows from 8x8 to 32x32 at relative frame 2.
    struct GrowingSource;

    impl Source for GrowingSource {
        fn name(&self) -> &'static str {
            "growing"
        }

        fn image_source(&self) -> Option<&dyn ImageSource> {
            Some(self)
        }
    }

    impl ImageSource for GrowingSource {
        fn image(
            &self,
            _ctx: &EngineContext,
            relative_frame: i64,
        ) -> Result<Arc<RgbaImage>, OperatorError> {
            let size = if relative_frame < 2 { 8 } else { 32 };
            Ok(Arc::new(RgbaImage::from_pixel(size, size, image::Rgba([255; 4]))))
        }
    }

    #[test]
    fn resized_source_reallocates_texture_and_targets_but_keeps_programs() {
        let mut compositor = compositor();
        let ctx = EngineContext::default();
        let keyframe = Keyframe::new(0, Arc::new(GrowingSource))
            .with_action(Arc::new(ShowAction { layer: 0 }))
            .with_effect(Arc::new(QuadEffect::default()))
            .with_effect(shader("color.g = 0.0;", true))
            .with_effect(shader("color.b = 0.0;", false));
        let id = keyframe.id();
        let state = state_of(vec![keyframe], 0);

        for frame in 0..4 {
            compositor.render(&state, &ctx, frame).unwrap();
        }

        let backend = compositor.backend();
        assert_eq!(backend.textures, vec![(8, 8), (32, 32)]);
        assert_eq!(backend.targets, vec![(8, 8), (32, 32)]);
        assert_eq!(
            backend.compiled,
            vec![StageKind::Intermediate, StageKind::Final]
        );
        assert_eq!(backend.uploads, 4);
        assert_eq!(backend.draws.len(), 4);
        assert!(backend.draws.iter().all(|draw| draw.has_targets));

        let stats = compositor.stats();
        assert_eq!(stats.programs_compiled, 2);
        assert_eq!(stats.textures_allocated, 2);
        assert_eq!(stats.targets_allocated, 2);
        assert_eq!(compositor.cache(id).and_then(|c| c.texture_size()), Some((32, 32)));
    }

    #[test]
    fn invalidate_drops_the_cache_entry() {
        let mut compositor = compositor();
        let ctx = EngineContext::default();
        let keyframe = visible(0, 8);
        let id = keyframe.id();
        let state = state_of(vec![keyframe], 0);
        compositor.render(&state, &ctx, 0).unwrap();
        compositor.render(&state, &ctx, 1).unwrap();
        assert_eq!(compositor.backend().textures, vec![(8, 8)]);

        compositor.invalidate(id);
        assert!(compositor.cache(id).is_none());
        compositor.render(&state, &ctx, 2).unwrap();
        assert_eq!(compositor.backend().textures, vec![(8, 8), (8, 8)]);
        assert_eq!(compositor.stats().programs_compiled, 2);
    }

    #[test]
    fn frames_start_from_the_configured_clear_colour() {
        let config = RendererConfig {
            clear_color: [1.0, 0.0, 0.0, 1.0],
            ..RendererConfig::default()
        };
        let mut compositor = FrameCompositor::new(
            RecordingBackend {
                clear_color: [0.0; 4],
                ..RecordingBackend::default()
            },
            &config,
        );
        let frame = compositor
            .render(&AccumulatedState::default(), &EngineContext::default(), 0)
            .unwrap();
        assert_eq!(frame.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(compositor.backend().clear_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn retain_releases_removed_keyframes() {
        let mut compositor = compositor();
        let ctx = EngineContext::default();
        let a = visible(0, 4);
        let b = visible(0, 4);
        compositor
            .render(&state_of(vec![a.clone(), b.clone()], 0), &ctx, 0)
            .unwrap();
        assert_eq!(compositor.cached_keyframes(), 2);

        compositor.retain([a.id()]);
        assert_eq!(compositor.cached_keyframes(), 1);
        assert!(compositor.cache(a.id()).is_some());
        assert!(compositor.cache(b.id()).is_none());
    }

    #[test]
    fn compile_failure_surfaces() {
        let mut compositor = FrameCompositor::new(
            RecordingBackend {
                fail_compile: true,
                ..RecordingBackend::default()
            },
            &RendererConfig::default(),
        );
        let state = state_of(vec![visible(0, 4)], 0);
        let err = compositor
            .render(&state, &EngineContext::default(), 0)
            .unwrap_err();
        assert!(matches!(err, RenderError::Gpu(_)));
    }
}
