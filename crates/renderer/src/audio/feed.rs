use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use timeline::{AccumulatedState, EngineContext};
use tracing::{error, trace};

use super::mixer::{mix_sound_block, AudioBlock, BLOCK_SIZE};
use super::snapshot::SnapshotSlot;
use super::spectrum::SpectrumHistory;

/// What the audio callback needs from the render tick.
#[derive(Debug, Clone, Default)]
pub struct AudioSnapshot {
    pub state: AccumulatedState,
    pub playing: bool,
}

/// Keeps the audio callback and the seek worker off the operators at the
/// same time.
///
/// A mix announces itself before it re-checks the seeking flag, and a seek
/// raises the flag before it waits for running mixes to drain. With both
/// sides sequentially consistent, at least one of them sees the other.
#[derive(Debug, Default)]
pub(crate) struct MixGate {
    seeking: AtomicBool,
    mixing: AtomicUsize,
}

/// Held by the audio callback for the duration of one mix.
pub(crate) struct MixGuard<'a> {
    gate: &'a MixGate,
}

impl Drop for MixGuard<'_> {
    fn drop(&mut self) {
        self.gate.mixing.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MixGate {
    pub fn is_seeking(&self) -> bool {
        self.seeking.load(Ordering::SeqCst)
    }

    pub fn set_seeking(&self, seeking: bool) {
        self.seeking.store(seeking, Ordering::SeqCst);
    }

    /// Returns `None` when a seek owns the operators.
    pub fn begin_mix(&self) -> Option<MixGuard<'_>> {
        self.mixing.fetch_add(1, Ordering::SeqCst);
        let guard = MixGuard { gate: self };
        if self.is_seeking() {
            return None;
        }
        Some(guard)
    }

    /// Blocks until no mix is running. Callers raise the seeking flag first.
    pub fn wait_for_mix(&self) {
        while self.mixing.load(Ordering::SeqCst) > 0 {
            thread::yield_now();
        }
    }
}

/// State shared between the render tick and every [`AudioFeed`].
pub(crate) struct SharedPlayback {
    ctx: EngineContext,
    snapshot: SnapshotSlot<AudioSnapshot>,
    sample: AtomicU64,
    gate: Arc<MixGate>,
    history: Mutex<SpectrumHistory>,
}

impl SharedPlayback {
    pub fn new(ctx: EngineContext, start_sample: i64) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            snapshot: SnapshotSlot::new(AudioSnapshot::default()),
            sample: AtomicU64::new(clamp_sample(start_sample)),
            gate: Arc::new(MixGate::default()),
            history: Mutex::new(SpectrumHistory::new()),
        })
    }

    pub fn publish(&self, state: AccumulatedState, playing: bool) {
        self.snapshot.publish(AudioSnapshot { state, playing });
    }

    /// Republishes the current state as stopped so the callback goes quiet
    /// without waiting for the next tick.
    pub fn halt(&self) {
        let latest = self.snapshot.latest();
        if latest.playing {
            self.publish(latest.state.clone(), false);
        }
    }

    pub fn sample(&self) -> i64 {
        self.sample.load(Ordering::Acquire) as i64
    }

    pub fn set_sample(&self, sample: i64) {
        self.sample.store(clamp_sample(sample), Ordering::Release);
    }

    pub fn is_seeking(&self) -> bool {
        self.gate.is_seeking()
    }

    pub fn set_seeking(&self, seeking: bool) {
        self.gate.set_seeking(seeking);
    }

    pub fn gate(&self) -> Arc<MixGate> {
        Arc::clone(&self.gate)
    }

    /// Current magnitudes and level. Blocks briefly on the history lock.
    pub fn spectrum(&self) -> (Vec<f32>, f32) {
        let history = self.history.lock();
        (history.magnitudes().to_vec(), history.level())
    }

    pub fn reset_spectrum(&self) {
        self.history.lock().reset();
    }
}

fn clamp_sample(sample: i64) -> u64 {
    sample.max(0) as u64
}

/// Pull-side handle for the audio device callback.
///
/// Each clone keeps the last snapshot it managed to read so a contended
/// slot never stalls the callback.
#[derive(Clone)]
pub struct AudioFeed {
    shared: Arc<SharedPlayback>,
    last: Arc<AudioSnapshot>,
}

impl AudioFeed {
    pub(crate) fn new(shared: Arc<SharedPlayback>) -> Self {
        let last = shared.snapshot.latest();
        Self { shared, last }
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.ctx.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.shared.ctx.channels
    }

    /// Produces the next block and advances the shared sample counter.
    ///
    /// Silence while stopped or seeking. Operator errors and panics are
    /// logged and replaced by silence; the callback always gets a block.
    pub fn next_block(&mut self) -> AudioBlock {
        if let Some(latest) = self.shared.snapshot.try_latest() {
            self.last = latest;
        }
        let ctx = &self.shared.ctx;
        let channels = usize::from(ctx.channels);
        let start = self.shared.sample.load(Ordering::Acquire);

        if !self.last.playing {
            return AudioBlock::silent(start as i64, channels);
        }
        let Some(_mixing) = self.shared.gate.begin_mix() else {
            return AudioBlock::silent(start as i64, channels);
        };

        let state = &self.last.state;
        let block = match catch_unwind(AssertUnwindSafe(|| {
            mix_sound_block(state, start as i64, ctx)
        })) {
            Ok(Ok(block)) => block,
            Ok(Err(err)) => {
                error!(sample = start, error = %err, "audio mix failed; emitting silence");
                AudioBlock::silent(start as i64, channels)
            }
            Err(_) => {
                error!(sample = start, "audio mix panicked; emitting silence");
                AudioBlock::silent(start as i64, channels)
            }
        };

        // A seek that landed meanwhile owns the counter.
        let _ = self.shared.sample.compare_exchange(
            start,
            start + BLOCK_SIZE as u64,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        match self.shared.history.try_lock() {
            Some(mut history) => history.push(&block),
            None => trace!(sample = start, "spectrum history busy; skipped block"),
        }
        block
    }
}
