use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use timeline::{AccumulatedState, EngineContext, KeyframeId};
use tracing::{debug, info, warn};

use crate::audio::MixGate;
use crate::RenderError;

/// A seekable operator that failed to reposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekFailure {
    pub keyframe: KeyframeId,
    pub operator: &'static str,
    pub message: String,
}

/// Sent back to the render tick once every operator has been notified.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekCompletion {
    pub generation: u64,
    pub frame: i64,
    pub sample: i64,
    pub failures: Vec<SeekFailure>,
}

/// What [`SeekCoordinator::poll`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum SeekEvent {
    /// Nothing in flight and nothing queued.
    Idle,
    /// A seek is still running or waiting for the worker.
    Pending,
    Completed(SeekCompletion),
    /// The deadline passed; the caller should land on the target anyway.
    /// The worker may still be inside an operator, so the coordinator stays
    /// busy until it returns.
    Abandoned { frame: i64, sample: i64 },
}

struct SeekJob {
    generation: u64,
    frame: i64,
    sample: i64,
    state: AccumulatedState,
    ctx: EngineContext,
}

struct InFlight {
    generation: u64,
    frame: i64,
    sample: i64,
    started: Instant,
}

/// Runs operator seeks on a dedicated worker thread.
///
/// At most one seek runs at a time. A request made while one is running
/// replaces any request still waiting (latest wins). Completions come back
/// over a channel and are collected by [`poll`](Self::poll) on the render
/// tick; nothing here blocks the caller.
///
/// The worker waits on the [`MixGate`] before touching operators, so the
/// audio callback is never inside a mix while a seek runs.
pub struct SeekCoordinator {
    jobs: Option<Sender<SeekJob>>,
    completions: Receiver<SeekCompletion>,
    join_handle: Option<JoinHandle<()>>,
    deadline: Option<Duration>,
    generation: u64,
    in_flight: Option<InFlight>,
    queued: Option<SeekJob>,
    /// Jobs handed to the worker that it has not finished, abandoned or not.
    outstanding: Arc<AtomicUsize>,
}

impl SeekCoordinator {
    pub(crate) fn spawn(
        deadline: Option<Duration>,
        gate: Arc<MixGate>,
    ) -> Result<Self, RenderError> {
        let (job_tx, job_rx) = bounded(1);
        let (done_tx, done_rx) = unbounded();
        let outstanding = Arc::new(AtomicUsize::new(0));
        let worker_outstanding = Arc::clone(&outstanding);
        let handle = thread::Builder::new()
            .name("keyreel-seek".into())
            .spawn(move || run_seek_worker(job_rx, done_tx, gate, worker_outstanding))
            .map_err(|err| RenderError::Worker(format!("failed to spawn seek worker: {err}")))?;

        Ok(Self {
            jobs: Some(job_tx),
            completions: done_rx,
            join_handle: Some(handle),
            deadline,
            generation: 0,
            in_flight: None,
            queued: None,
            outstanding,
        })
    }

    /// True while a seek is running or queued, including an abandoned seek
    /// whose operator has not returned yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.queued.is_some() || self.worker_running()
    }

    fn worker_running(&self) -> bool {
        self.outstanding.load(Ordering::Acquire) > 0
    }

    /// Requests that every seekable operator in `state` move to `frame`.
    /// Returns the request's generation.
    pub fn request(
        &mut self,
        frame: i64,
        sample: i64,
        state: AccumulatedState,
        ctx: EngineContext,
        now: Instant,
    ) -> u64 {
        self.generation += 1;
        let job = SeekJob {
            generation: self.generation,
            frame,
            sample,
            state,
            ctx,
        };
        if let Some(replaced) = self.queued.replace(job) {
            debug!(
                generation = replaced.generation,
                frame = replaced.frame,
                "superseded queued seek"
            );
        }
        self.dispatch(now);
        self.generation
    }

    /// Collects completions, enforces the deadline and starts queued work.
    pub fn poll(&mut self, now: Instant) -> SeekEvent {
        let mut event = None;
        for completion in self.completions.try_iter() {
            match &self.in_flight {
                Some(current) if current.generation == completion.generation => {
                    self.in_flight = None;
                    event = Some(SeekEvent::Completed(completion));
                }
                _ => debug!(
                    generation = completion.generation,
                    "discarding stale seek completion"
                ),
            }
        }

        if event.is_none() {
            if let (Some(current), Some(deadline)) = (&self.in_flight, self.deadline) {
                if now.saturating_duration_since(current.started) > deadline {
                    warn!(
                        frame = current.frame,
                        deadline = ?deadline,
                        "seek exceeded its deadline; continuing without it"
                    );
                    event = Some(SeekEvent::Abandoned {
                        frame: current.frame,
                        sample: current.sample,
                    });
                    self.in_flight = None;
                }
            }
        }

        self.dispatch(now);
        event.unwrap_or(if self.is_busy() {
            SeekEvent::Pending
        } else {
            SeekEvent::Idle
        })
    }

    fn dispatch(&mut self, now: Instant) {
        // The deadline of a queued seek starts once the worker is free.
        if self.in_flight.is_some() || self.worker_running() {
            return;
        }
        let (Some(job), Some(jobs)) = (self.queued.take(), self.jobs.as_ref()) else {
            return;
        };
        let (generation, frame, sample) = (job.generation, job.frame, job.sample);
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        match jobs.try_send(job) {
            Ok(()) => {
                debug!(generation, frame, "dispatched seek");
                self.in_flight = Some(InFlight {
                    generation,
                    frame,
                    sample,
                    started: now,
                });
            }
            Err(TrySendError::Full(job)) => {
                self.outstanding.fetch_sub(1, Ordering::AcqRel);
                self.queued = Some(job);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.outstanding.fetch_sub(1, Ordering::AcqRel);
                warn!(frame, "seek worker is gone; dropping seek");
            }
        }
    }
}

impl Drop for SeekCoordinator {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_seek_worker(
    jobs: Receiver<SeekJob>,
    done: Sender<SeekCompletion>,
    gate: Arc<MixGate>,
    outstanding: Arc<AtomicUsize>,
) {
    for job in jobs.iter() {
        gate.wait_for_mix();
        let completion = perform_seek(job);
        outstanding.fetch_sub(1, Ordering::AcqRel);
        if done.send(completion).is_err() {
            break;
        }
    }
    debug!("seek worker exiting");
}

/// Notifies every seekable operator of every keyframe in the job's state.
/// Failures are collected; they never stop the remaining operators.
fn perform_seek(job: SeekJob) -> SeekCompletion {
    let mut failures = Vec::new();
    for entry in &job.state {
        let keyframe = &entry.keyframe;
        let relative_frame = job.frame - keyframe.time();
        for (operator, seekable) in keyframe.seek_targets() {
            let outcome = catch_unwind(AssertUnwindSafe(|| seekable.seek(&job.ctx, relative_frame)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            warn!(keyframe = %keyframe.id(), operator, error = %message, "seek failed");
            failures.push(SeekFailure {
                keyframe: keyframe.id(),
                operator,
                message,
            });
        }
    }
    info!(frame = job.frame, failures = failures.len(), "seek finished");
    SeekCompletion {
        generation: job.generation,
        frame: job.frame,
        sample: job.sample,
        failures,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
