use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use projectfile::ProjectFile;
use renderer::{
    export, AudioOutput, Engine, ExportRequest, FfmpegSink, GpuPowerPreference, RendererConfig,
    WgpuBackend,
};
use timeline::{compute_active_state, Timeline};
use tracing_subscriber::EnvFilter;

use crate::cli::{PlayArgs, ProjectArgs, RenderArgs, StateArgs};
use crate::present::PngSnapshotSink;
use crate::report::StateReport;

const DEFAULT_PLAY_SECONDS: f64 = 10.0;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// A parsed project with its overrides applied and its timeline built.
struct LoadedProject {
    project: ProjectFile,
    timeline: Timeline,
}

fn load_project(args: &ProjectArgs) -> Result<LoadedProject> {
    let mut project = ProjectFile::load(&args.project)
        .with_context(|| format!("failed to load project {}", args.project.display()))?;
    if let Some((width, height)) = args.size {
        project.output.width = width;
        project.output.height = height;
    }
    if let Some(frame_rate) = args.frame_rate {
        project.output.frame_rate = frame_rate;
    }
    if let Some(sample_rate) = args.sample_rate {
        project.output.sample_rate = sample_rate;
    }
    project
        .validate()
        .context("project overrides produced an invalid configuration")?;

    let base_dir = project_dir(&args.project);
    let timeline = Timeline::from_project(&project, &base_dir)
        .with_context(|| format!("failed to build timeline from {}", args.project.display()))?;
    tracing::debug!(
        path = %args.project.display(),
        keyframes = timeline.len(),
        width = project.output.width,
        height = project.output.height,
        "project loaded"
    );
    Ok(LoadedProject { project, timeline })
}

fn project_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn build_engine(
    loaded: LoadedProject,
    power: GpuPowerPreference,
    now: Instant,
) -> Result<Engine<WgpuBackend>> {
    let config = RendererConfig::from_project(&loaded.project);
    let backend = WgpuBackend::new(config.output_size, power)
        .context("failed to initialise the GPU backend")?;
    Engine::new(backend, config, loaded.timeline, now).context("failed to start the engine")
}

pub fn run_state(args: StateArgs) -> Result<()> {
    let LoadedProject {
        project,
        mut timeline,
    } = load_project(&args.project)?;
    let ctx = RendererConfig::from_project(&project).engine_context();
    let state = compute_active_state(&mut timeline, args.frame, &ctx);
    let report = StateReport::new(args.frame, &state);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_table());
    }
    Ok(())
}

pub fn run_render(args: RenderArgs) -> Result<()> {
    let loaded = load_project(&args.project)?;
    let start_frame = args
        .start
        .unwrap_or(loaded.project.playback.start_frame);
    let frame_count = match args.frames.or_else(|| loaded.project.length_in_frames()) {
        Some(0) | None => bail!("no frame count: pass --frames or set playback.length"),
        Some(count) => count,
    };

    let mut engine = build_engine(loaded, args.gpu_power, Instant::now())?;
    let request = ExportRequest {
        start_frame,
        frame_count,
        out_path: args.output.clone(),
        overwrite: !args.no_overwrite,
        with_audio: !args.no_audio && engine.config().audio_enabled,
    };
    tracing::info!(
        start_frame,
        frame_count,
        audio = request.with_audio,
        output = %args.output.display(),
        "rendering"
    );

    let mut sink = FfmpegSink::new();
    let summary = export(&mut engine, &mut sink, &request)
        .with_context(|| format!("failed to export {}", args.output.display()))?;
    println!(
        "wrote {} frames ({} audio samples) to {}",
        summary.frames,
        summary.audio_samples,
        args.output.display()
    );
    Ok(())
}

pub fn run_play(args: PlayArgs) -> Result<()> {
    let loaded = load_project(&args.project)?;
    let seconds = args
        .seconds
        .or_else(|| {
            loaded
                .project
                .playback
                .length
                .map(|length| length.as_secs_f64())
        })
        .unwrap_or(DEFAULT_PLAY_SECONDS);
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    let play_for = Duration::from_secs_f64(seconds);

    let mut engine = build_engine(loaded, args.gpu_power, Instant::now())?;

    let _audio = if args.no_audio || !engine.config().audio_enabled {
        tracing::info!("audio output disabled");
        None
    } else {
        let device = args
            .device
            .clone()
            .or_else(|| engine.config().audio_device.clone());
        match AudioOutput::start(device.as_deref(), engine.audio_feed()) {
            Ok(output) => {
                tracing::info!(device = output.device_name(), "audio output started");
                Some(output)
            }
            Err(err) => {
                tracing::warn!(error = %err, "audio output unavailable; playing silently");
                None
            }
        }
    };

    if let Some(frame) = args.seek {
        let mode = engine.seek(frame, Instant::now());
        tracing::info!(frame, ?mode, "seeking before playback");
    }

    let mut sink = PngSnapshotSink::new(args.snapshot.clone());
    let mut stop_at: Option<Instant> = None;
    let ticks = engine
        .run(&mut sink, |engine, now| match stop_at {
            Some(stop) => now < stop,
            None => {
                if !engine.is_seeking() {
                    engine.play(now);
                    stop_at = Some(now + play_for);
                }
                true
            }
        })
        .context("render loop failed")?;

    engine.pause(Instant::now());
    tracing::info!(ticks, presented = sink.presented(), "playback finished");
    if let Some(path) = sink.write_snapshot()? {
        println!("snapshot written to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_dir_defaults_to_current_directory() {
        assert_eq!(project_dir(Path::new("demo.toml")), PathBuf::from("."));
        assert_eq!(
            project_dir(Path::new("shows/demo.toml")),
            PathBuf::from("shows")
        );
    }

    #[test]
    fn overrides_are_applied_before_the_timeline_is_built() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.toml");
        std::fs::write(
            &path,
            r#"
version = 1

[output]
width = 320
height = 240

[[keyframes]]
time = 0
source = { kind = "solid", width = 4, height = 4, rgba = [255, 0, 0, 255] }
actions = [{ kind = "show" }]
"#,
        )
        .unwrap();

        let args = ProjectArgs {
            project: path,
            size: Some((64, 48)),
            frame_rate: Some(30.0),
            sample_rate: None,
        };
        let loaded = load_project(&args).unwrap();
        assert_eq!(loaded.project.output.width, 64);
        assert_eq!(loaded.project.output.height, 48);
        assert_eq!(loaded.project.output.frame_rate, 30.0);
        assert_eq!(loaded.timeline.len(), 1);
    }

    #[test]
    fn rejects_invalid_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.toml");
        std::fs::write(&path, "version = 1\n").unwrap();
        let args = ProjectArgs {
            project: path,
            size: None,
            frame_rate: Some(-1.0),
            sample_rate: None,
        };
        assert!(load_project(&args).is_err());
    }
}
