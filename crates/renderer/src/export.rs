//! Offline rendering to a frame sink, with the soundtrack mixed from the
//! same blocks live playback would produce.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use tempfile::NamedTempFile;
use timeline::OperatorError;
use tracing::{debug, info};

use crate::audio::BLOCK_SIZE;
use crate::engine::Engine;
use crate::pipeline::CompositeBackend;
use crate::types::Frame;
use crate::RenderError;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{context} '{}': {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ffmpeg is required for export but was not found on PATH")]
    FfmpegMissing,
    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),
    #[error("invalid export: {0}")]
    Invalid(String),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("audio mix failed: {0}")]
    Audio(#[from] OperatorError),
}

impl ExportError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        ExportError::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Raw interleaved `f32le` soundtrack to mux alongside the frames.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInput {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub out_path: PathBuf,
    pub overwrite: bool,
    pub audio: Option<AudioInput>,
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.width == 0 || self.height == 0 {
            return Err(ExportError::Invalid("width and height must be non-zero".into()));
        }
        if self.frame_rate.is_nan() || self.frame_rate <= 0.0 {
            return Err(ExportError::Invalid("frame rate must be positive".into()));
        }
        Ok(())
    }
}

/// Consumes exported frames in order. Any error aborts the export.
pub trait ExportSink {
    fn begin(&mut self, config: &SinkConfig) -> Result<(), ExportError>;

    fn push_frame(&mut self, frame: &Frame) -> Result<(), ExportError>;

    fn end(&mut self) -> Result<(), ExportError>;
}

/// Collects frames in memory.
#[derive(Debug, Default)]
pub struct InMemorySink {
    pub config: Option<SinkConfig>,
    pub frames: Vec<Frame>,
    /// Size of the soundtrack file as seen at `begin`.
    pub audio_bytes: Option<u64>,
    pub ended: bool,
}

impl ExportSink for InMemorySink {
    fn begin(&mut self, config: &SinkConfig) -> Result<(), ExportError> {
        if let Some(audio) = &config.audio {
            let metadata = std::fs::metadata(&audio.path)
                .map_err(|err| ExportError::io("failed to stat soundtrack", &audio.path, err))?;
            self.audio_bytes = Some(metadata.len());
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn push_frame(&mut self, frame: &Frame) -> Result<(), ExportError> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn end(&mut self) -> Result<(), ExportError> {
        self.ended = true;
        Ok(())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|err| ExportError::io("failed to create output directory", parent, err)),
        _ => Ok(()),
    }
}

/// Pipes raw RGBA frames into the system `ffmpeg` and encodes H.264, with
/// AAC audio when a soundtrack is supplied.
#[derive(Default)]
pub struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
}

impl FfmpegSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn arguments(config: &SinkConfig) -> Vec<String> {
        let mut args: Vec<String> = vec![
            if config.overwrite { "-y" } else { "-n" }.into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", config.width, config.height),
            "-r".into(),
            config.frame_rate.to_string(),
            "-i".into(),
            "pipe:0".into(),
        ];
        match &config.audio {
            Some(audio) => args.extend([
                "-f".into(),
                "f32le".into(),
                "-ar".into(),
                audio.sample_rate.to_string(),
                "-ac".into(),
                audio.channels.to_string(),
                "-i".into(),
                audio.path.display().to_string(),
                "-c:a".into(),
                "aac".into(),
                "-shortest".into(),
            ]),
            None => args.push("-an".into()),
        }
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "+faststart".into(),
            config.out_path.display().to_string(),
        ]);
        args
    }
}

impl ExportSink for FfmpegSink {
    fn begin(&mut self, config: &SinkConfig) -> Result<(), ExportError> {
        config.validate()?;
        if config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(ExportError::Invalid(
                "width and height must be even for yuv420p output".into(),
            ));
        }
        if !config.overwrite && config.out_path.exists() {
            return Err(ExportError::Invalid(format!(
                "output file '{}' already exists",
                config.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(ExportError::FfmpegMissing);
        }
        ensure_parent_dir(&config.out_path)?;

        let args = Self::arguments(config);
        debug!(?args, "spawning ffmpeg");
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ExportError::Ffmpeg(format!("failed to spawn: {err}")))?;
        self.stdin = child.stdin.take();
        // Drain stderr so a chatty encoder never blocks on a full pipe.
        self.stderr = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });
        self.child = Some(child);
        self.frame_len = config.width as usize * config.height as usize * 4;
        Ok(())
    }

    fn push_frame(&mut self, frame: &Frame) -> Result<(), ExportError> {
        if frame.rgba.len() != self.frame_len {
            return Err(ExportError::Invalid(format!(
                "frame of {}x{} does not match the export size",
                frame.width, frame.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExportError::Ffmpeg("encoder is not running".into()))?;
        stdin
            .write_all(&frame.rgba)
            .map_err(|err| ExportError::Ffmpeg(format!("failed to write frame: {err}")))
    }

    fn end(&mut self) -> Result<(), ExportError> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|err| ExportError::Ffmpeg(format!("failed to wait for ffmpeg: {err}")))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(ExportError::Ffmpeg(format!("exited with {status}: {}", stderr.trim())));
        }
        Ok(())
    }
}

/// Frames to export and where to put them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub start_frame: i64,
    pub frame_count: u64,
    pub out_path: PathBuf,
    pub overwrite: bool,
    pub with_audio: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub frames: u64,
    pub audio_samples: u64,
}

/// Renders `request` through `sink`. The soundtrack is mixed block by block
/// into a temporary `f32le` file first, then every frame is composited and
/// pushed in order.
pub fn export<B, S>(
    engine: &mut Engine<B>,
    sink: &mut S,
    request: &ExportRequest,
) -> Result<ExportSummary, ExportError>
where
    B: CompositeBackend,
    S: ExportSink + ?Sized,
{
    if request.frame_count == 0 {
        return Err(ExportError::Invalid("nothing to export".into()));
    }
    let ctx = *engine.context();
    let end_frame = request.start_frame + request.frame_count as i64;

    // Deleted on drop, whichever way the export ends.
    let mut soundtrack: Option<NamedTempFile> = None;
    let mut summary = ExportSummary::default();
    let audio = if request.with_audio {
        let file = tempfile::Builder::new()
            .prefix("keyreel_audio_")
            .suffix(".f32le")
            .tempfile()
            .map_err(|err| {
                ExportError::io("failed to create soundtrack", &std::env::temp_dir(), err)
            })?;
        let path = file.path().to_path_buf();
        let file = soundtrack.insert(file);
        summary.audio_samples = mix_soundtrack(
            engine,
            ctx.sample_anchor(request.start_frame),
            ctx.sample_anchor(end_frame),
            file.as_file_mut(),
            &path,
        )?;
        Some(AudioInput {
            path,
            sample_rate: ctx.sample_rate,
            channels: ctx.channels,
        })
    } else {
        None
    };

    let config = SinkConfig {
        width: ctx.output_width,
        height: ctx.output_height,
        frame_rate: ctx.frame_rate,
        out_path: request.out_path.clone(),
        overwrite: request.overwrite,
        audio,
    };
    sink.begin(&config)?;
    for frame_index in request.start_frame..end_frame {
        let frame = engine.render_frame_at(frame_index)?;
        sink.push_frame(&frame)?;
        summary.frames += 1;
        if summary.frames % 60 == 0 {
            debug!(frames = summary.frames, total = request.frame_count, "export progress");
        }
    }
    sink.end()?;

    info!(
        frames = summary.frames,
        audio_samples = summary.audio_samples,
        path = %request.out_path.display(),
        "export finished"
    );
    Ok(summary)
}

/// Mixes samples `[start, end)` into `path` as interleaved `f32le`. Returns
/// the number of sample frames written.
pub fn write_soundtrack<B: CompositeBackend>(
    engine: &mut Engine<B>,
    start: i64,
    end: i64,
    path: &Path,
) -> Result<u64, ExportError> {
    let file = File::create(path)
        .map_err(|err| ExportError::io("failed to create soundtrack", path, err))?;
    mix_soundtrack(engine, start, end, file, path)
}

/// `path` only labels errors.
fn mix_soundtrack<B: CompositeBackend, W: Write>(
    engine: &mut Engine<B>,
    start: i64,
    end: i64,
    out: W,
    path: &Path,
) -> Result<u64, ExportError> {
    let mut writer = BufWriter::new(out);
    let channels = usize::from(engine.context().channels.max(1));

    let mut written = 0u64;
    let mut sample = start;
    while sample < end {
        let block = engine.mix_block_at(sample)?;
        let take = ((end - sample) as usize).min(BLOCK_SIZE);
        for value in &block.interleaved()[..take * channels] {
            writer
                .write_all(&value.to_le_bytes())
                .map_err(|err| ExportError::io("failed to write soundtrack", path, err))?;
        }
        written += take as u64;
        sample += BLOCK_SIZE as i64;
    }
    writer
        .flush()
        .map_err(|err| ExportError::io("failed to write soundtrack", path, err))?;
    Ok(written)
}
