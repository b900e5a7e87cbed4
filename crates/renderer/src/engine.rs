use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use timeline::{
    compute_active_state, EngineContext, Keyframe, KeyframeId, OperatorError, Timeline,
    TimelineError, TICKS_PER_SECOND,
};
use tracing::{debug, info, warn};

use crate::audio::{mix_sound_block, AudioBlock, AudioFeed, SharedPlayback};
use crate::cursor::PlaybackCursor;
use crate::pipeline::{CompositeBackend, FrameCompositor};
use crate::seek::{SeekCoordinator, SeekEvent};
use crate::types::{Frame, RendererConfig};
use crate::RenderError;

/// Result of one render tick, returned by value.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub frame_index: i64,
    pub frame: Frame,
    pub spectrum: Vec<f32>,
    pub spectrum_level: f32,
    /// The frame is the neutral clear frame because a seek is running.
    pub seeking: bool,
}

/// How a seek request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Playing: the cursor moved immediately, operators were not notified.
    Jumped,
    /// Stopped: operators are being notified on the seek worker.
    Dispatched { generation: u64 },
}

/// Receives what the render loop produces.
pub trait PresentationSink {
    fn present(&mut self, frame_index: i64, frame: &Frame);

    fn spectrum(&mut self, _magnitudes: &[f32], _level: f32) {}
}

/// Owns the timeline, the playback cursor, the compositor and the seek
/// worker. Everything here runs on the render tick's thread; the audio
/// callback only sees what [`tick`](Self::tick) publishes.
pub struct Engine<B: CompositeBackend> {
    config: RendererConfig,
    ctx: EngineContext,
    timeline: Timeline,
    cursor: PlaybackCursor,
    compositor: FrameCompositor<B>,
    seeker: SeekCoordinator,
    playback: Arc<SharedPlayback>,
    last: Option<TickOutput>,
    dirty: bool,
}

impl<B: CompositeBackend> Engine<B> {
    pub fn new(
        backend: B,
        config: RendererConfig,
        timeline: Timeline,
        now: Instant,
    ) -> Result<Self, RenderError> {
        let ctx = config.engine_context();
        let cursor = PlaybackCursor::new(ctx, config.start_frame, now);
        let playback = SharedPlayback::new(ctx, cursor.sample(now));
        let seeker = SeekCoordinator::spawn(config.seek_deadline, playback.gate())?;
        let compositor = FrameCompositor::new(backend, &config);
        info!(
            keyframes = timeline.len(),
            width = ctx.output_width,
            height = ctx.output_height,
            frame_rate = ctx.frame_rate,
            "engine ready"
        );

        Ok(Self {
            config,
            ctx,
            timeline,
            cursor,
            compositor,
            seeker,
            playback,
            last: None,
            dirty: true,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn compositor(&self) -> &FrameCompositor<B> {
        &self.compositor
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn is_playing(&self) -> bool {
        self.cursor.is_playing()
    }

    pub fn is_seeking(&self) -> bool {
        self.cursor.is_seeking()
    }

    /// A handle for the audio device callback.
    pub fn audio_feed(&self) -> AudioFeed {
        AudioFeed::new(Arc::clone(&self.playback))
    }

    pub fn play(&mut self, now: Instant) {
        if self.cursor.is_playing() {
            return;
        }
        self.cursor.play(now);
        self.playback.set_sample(self.cursor.sample(now));
        self.dirty = true;
        debug!(frame = self.cursor.frame(now), "playback started");
    }

    pub fn pause(&mut self, now: Instant) {
        if !self.cursor.is_playing() {
            return;
        }
        self.cursor.pause(now);
        self.playback.halt();
        self.dirty = true;
        debug!(frame = self.cursor.frame(now), "playback paused");
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.cursor.is_playing() {
            self.pause(now);
        } else {
            self.play(now);
        }
    }

    /// Moves playback to `frame`.
    ///
    /// While playing this is a synchronous cursor jump. While stopped the
    /// keyframes active right now are told to seek on the worker, and ticks
    /// emit the neutral frame until it finishes.
    pub fn seek(&mut self, frame: i64, now: Instant) -> SeekMode {
        let sample = self.ctx.sample_anchor(frame);
        if self.cursor.is_playing() {
            self.cursor.jump(frame, now);
            self.playback.set_sample(sample);
            self.dirty = true;
            debug!(frame, "jumped during playback");
            return SeekMode::Jumped;
        }

        // Raised before the worker can start so new mixes stay out.
        self.set_seeking(true);
        let current = self.cursor.frame(now);
        let state = compute_active_state(&mut self.timeline, current, &self.ctx);
        let generation = self.seeker.request(frame, sample, state, self.ctx, now);
        debug!(frame, generation, "seek dispatched");
        SeekMode::Dispatched { generation }
    }

    fn set_seeking(&mut self, seeking: bool) {
        self.cursor.set_seeking(seeking);
        self.playback.set_seeking(seeking);
    }

    /// Applies seek progress, then composites the frame at the cursor.
    ///
    /// While stopped with nothing changed the previous output is returned
    /// without touching the GPU.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutput, RenderError> {
        match self.seeker.poll(now) {
            SeekEvent::Completed(completion) => {
                if !completion.failures.is_empty() {
                    warn!(
                        frame = completion.frame,
                        failures = completion.failures.len(),
                        "seek finished with operator failures"
                    );
                }
                self.land(completion.frame, completion.sample, now);
            }
            SeekEvent::Abandoned { frame, sample } => self.land(frame, sample, now),
            SeekEvent::Idle | SeekEvent::Pending => {}
        }
        self.set_seeking(self.seeker.is_busy());

        let (spectrum, spectrum_level) = self.playback.spectrum();
        let frame_index = self.cursor.frame(now);
        if self.cursor.is_seeking() {
            let (width, height) = self.config.output_size;
            return Ok(TickOutput {
                frame_index,
                frame: Frame::solid(width, height, self.config.clear_color),
                spectrum,
                spectrum_level,
                seeking: true,
            });
        }

        if !self.cursor.is_playing() && !self.dirty {
            if let Some(last) = self.last.as_ref().filter(|last| last.frame_index == frame_index) {
                return Ok(last.clone());
            }
        }

        let mut ctx = self.ctx;
        ctx.spectrum_level = spectrum_level;
        let state = compute_active_state(&mut self.timeline, frame_index, &ctx);
        if !self.cursor.is_playing() {
            self.playback.set_sample(ctx.sample_anchor(frame_index));
        }
        self.playback.publish(state.clone(), self.cursor.is_playing());

        let frame = self.compositor.render(&state, &ctx, frame_index)?;
        let output = TickOutput {
            frame_index,
            frame,
            spectrum,
            spectrum_level,
            seeking: false,
        };
        self.last = Some(output.clone());
        self.dirty = false;
        Ok(output)
    }

    fn land(&mut self, frame: i64, sample: i64, now: Instant) {
        self.cursor.jump(frame, now);
        self.playback.set_sample(sample);
        self.playback.reset_spectrum();
        self.dirty = true;
    }

    /// Runs ticks at the reference rate, presenting each one, until
    /// `keep_going` returns false. Returns the number of ticks.
    pub fn run<S: PresentationSink>(
        &mut self,
        sink: &mut S,
        mut keep_going: impl FnMut(&mut Self, Instant) -> bool,
    ) -> Result<u64, RenderError> {
        let interval = Duration::from_secs_f64(1.0 / TICKS_PER_SECOND);
        let mut next = Instant::now();
        let mut ticks = 0u64;
        loop {
            let now = Instant::now();
            if !keep_going(self, now) {
                break;
            }
            let output = self.tick(now)?;
            sink.present(output.frame_index, &output.frame);
            sink.spectrum(&output.spectrum, output.spectrum_level);
            ticks += 1;

            next += interval;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                next = now;
            }
        }
        debug!(ticks, stats = ?self.compositor.stats(), "render loop finished");
        Ok(ticks)
    }

    /// Mutates the timeline and releases GPU caches of keyframes that left it.
    pub fn edit_timeline<R>(&mut self, edit: impl FnOnce(&mut Timeline) -> R) -> R {
        let result = edit(&mut self.timeline);
        self.compositor.retain(self.timeline.ids());
        self.dirty = true;
        result
    }

    /// Replaces keyframe `id`, dropping whatever the compositor cached for it.
    pub fn replace_keyframe(
        &mut self,
        id: KeyframeId,
        keyframe: Keyframe,
    ) -> Result<Keyframe, TimelineError> {
        let old = self.timeline.replace(id, keyframe)?;
        self.compositor.invalidate(id);
        self.compositor.retain(self.timeline.ids());
        self.dirty = true;
        Ok(old)
    }

    /// Composites `frame` outside the playback clock.
    pub fn render_frame_at(&mut self, frame: i64) -> Result<Frame, RenderError> {
        let state = compute_active_state(&mut self.timeline, frame, &self.ctx);
        self.compositor.render(&state, &self.ctx, frame)
    }

    /// Mixes the block starting at `sample` outside the playback clock,
    /// using the state of the frame that sample belongs to.
    pub fn mix_block_at(&mut self, sample: i64) -> Result<AudioBlock, OperatorError> {
        let frame = self.ctx.frame_at_sample(sample);
        let state = compute_active_state(&mut self.timeline, frame, &self.ctx);
        mix_sound_block(&state, sample, &self.ctx)
    }
}
