use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::GpuPowerPreference;

#[derive(Parser, Debug)]
#[command(
    name = "keyreel",
    author,
    version,
    about = "Timeline-driven audiovisual compositor"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the keyframes active at a frame, in draw order.
    State(StateArgs),
    /// Export frames and the mixed soundtrack through ffmpeg.
    Render(RenderArgs),
    /// Play the project in real time with audio output.
    Play(PlayArgs),
}

/// Project file plus overrides for its `[output]` table.
#[derive(Args, Debug)]
pub struct ProjectArgs {
    /// Project TOML file.
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// Override the output resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions)]
    pub size: Option<(u32, u32)>,

    /// Override the output frame rate.
    #[arg(long, value_name = "FPS")]
    pub frame_rate: Option<f64>,

    /// Override the mix sample rate.
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Frame to evaluate.
    #[arg(long, value_name = "FRAME", allow_negative_numbers = true)]
    pub frame: i64,

    /// Emit JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Destination video file.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Number of frames to export; defaults to `playback.length`.
    #[arg(long, value_name = "COUNT")]
    pub frames: Option<u64>,

    /// First frame to export; defaults to `playback.start_frame`.
    #[arg(long, value_name = "FRAME", allow_negative_numbers = true)]
    pub start: Option<i64>,

    /// Skip the soundtrack.
    #[arg(long)]
    pub no_audio: bool,

    /// Fail instead of replacing an existing output file.
    #[arg(long)]
    pub no_overwrite: bool,

    /// GPU adapter preference: `low` or `high`.
    #[arg(long, value_name = "POWER", value_parser = parse_power, default_value = "high")]
    pub gpu_power: GpuPowerPreference,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// How long to play; defaults to `playback.length`, then 10 seconds.
    #[arg(long, value_name = "SECONDS")]
    pub seconds: Option<f64>,

    /// Seek to this frame before playback starts. Runs the operators' seek
    /// hooks on the seek worker.
    #[arg(long, value_name = "FRAME", allow_negative_numbers = true)]
    pub seek: Option<i64>,

    /// Write the last presented frame to this PNG when playback ends.
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Play without opening an audio device.
    #[arg(long)]
    pub no_audio: bool,

    /// Audio output device name; overrides `audio.device`.
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// GPU adapter preference: `low` or `high`.
    #[arg(long, value_name = "POWER", value_parser = parse_power, default_value = "high")]
    pub gpu_power: GpuPowerPreference,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{w}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown GPU power preference '{other}'; expected low or high")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimensions() {
        assert_eq!(parse_dimensions("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_dimensions(" 64X48 ").unwrap(), (64, 48));
        assert!(parse_dimensions("0x10").is_err());
        assert!(parse_dimensions("1920").is_err());
        assert!(parse_dimensions("wide x tall").is_err());
    }

    #[test]
    fn parses_power_preferences() {
        assert_eq!(parse_power("LOW").unwrap(), GpuPowerPreference::Low);
        assert_eq!(parse_power("discrete").unwrap(), GpuPowerPreference::High);
        assert!(parse_power("medium").is_err());
    }

    #[test]
    fn state_command_accepts_negative_frames() {
        let cli = Cli::try_parse_from(["keyreel", "state", "demo.toml", "--frame", "-5", "--json"])
            .unwrap();
        let Command::State(args) = cli.command else {
            panic!("expected state command");
        };
        assert_eq!(args.frame, -5);
        assert!(args.json);
        assert_eq!(args.project.project, PathBuf::from("demo.toml"));
    }

    #[test]
    fn render_command_defaults() {
        let cli = Cli::try_parse_from([
            "keyreel", "render", "demo.toml", "-o", "out.mp4", "--size", "640x360",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render command");
        };
        assert_eq!(args.project.size, Some((640, 360)));
        assert_eq!(args.gpu_power, GpuPowerPreference::High);
        assert!(args.frames.is_none());
        assert!(!args.no_audio);
    }
}
