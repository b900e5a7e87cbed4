//! TOML project description for keyreel: output format, camera, playback and
//! audio settings, plus the keyframes that make up the timeline.

mod ops;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub use ops::{ActionSpec, EffectSpec, KeyframeSpec, SourceSpec};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("failed to read project file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse project: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid project: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectFile {
    pub version: u32,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub keyframes: Vec<KeyframeSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputSettings {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_true")]
    pub clear_intermediate: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            frame_rate: default_frame_rate(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            clear_color: default_clear_color(),
            clear_intermediate: true,
        }
    }
}

/// Camera placement in output pixel space. Angles are degrees.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CameraSettings {
    #[serde(default = "default_camera_x")]
    pub x: f32,
    #[serde(default = "default_camera_y")]
    pub y: f32,
    #[serde(default = "default_camera_z")]
    pub z: f32,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub roll: f32,
    #[serde(default = "default_fov")]
    pub fov: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            x: default_camera_x(),
            y: default_camera_y(),
            z: default_camera_z(),
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            fov: default_fov(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaybackSettings {
    #[serde(default)]
    pub start_frame: i64,
    #[serde(
        default = "default_seek_deadline",
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub seek_deadline: Option<Duration>,
    /// Default export length when the command line does not give one.
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub length: Option<Duration>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            start_frame: 0,
            seek_deadline: default_seek_deadline(),
            length: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AudioSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
        }
    }
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_frame_rate() -> f64 {
    60.0
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_clear_color() -> [f32; 4] {
    [0.1, 0.2, 0.2, 1.0]
}

fn default_true() -> bool {
    true
}

fn default_camera_x() -> f32 {
    -640.0
}

fn default_camera_y() -> f32 {
    -360.0
}

fn default_camera_z() -> f32 {
    -360.0
}

fn default_fov() -> f32 {
    90.0
}

fn default_seek_deadline() -> Option<Duration> {
    Some(Duration::from_secs(5))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let trimmed = v.trim();
            if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("off") {
                return Ok(None);
            }
            humantime::parse_duration(trimmed)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl ProjectFile {
    pub fn from_toml_str(input: &str) -> Result<Self, ProjectError> {
        let raw: ProjectFile = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Number of output frames covered by `playback.length`, if set.
    pub fn length_in_frames(&self) -> Option<u64> {
        self.playback
            .length
            .map(|length| (length.as_secs_f64() * self.output.frame_rate).floor() as u64)
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        if self.version != 1 {
            return Err(ProjectError::Invalid(format!(
                "unsupported project version {}; expected 1",
                self.version
            )));
        }

        let output = &self.output;
        if output.width == 0 || output.height == 0 {
            return Err(ProjectError::Invalid(format!(
                "output size {}x{} must be non-zero",
                output.width, output.height
            )));
        }
        if !(output.frame_rate.is_finite() && output.frame_rate > 0.0) {
            return Err(ProjectError::Invalid(
                "output.frame_rate must be greater than zero".into(),
            ));
        }
        if output.sample_rate == 0 {
            return Err(ProjectError::Invalid(
                "output.sample_rate must be greater than zero".into(),
            ));
        }
        if output.channels == 0 {
            return Err(ProjectError::Invalid(
                "output.channels must be at least 1".into(),
            ));
        }

        if !(self.camera.fov > 0.0 && self.camera.fov < 180.0) {
            return Err(ProjectError::Invalid(format!(
                "camera.fov {} must be between 0 and 180 degrees",
                self.camera.fov
            )));
        }

        if self.playback.seek_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ProjectError::Invalid(
                "playback.seek_deadline must be greater than zero".into(),
            ));
        }

        for (index, keyframe) in self.keyframes.iter().enumerate() {
            validate_keyframe(index, keyframe)?;
        }

        Ok(())
    }
}

fn validate_keyframe(index: usize, keyframe: &KeyframeSpec) -> Result<(), ProjectError> {
    let name = keyframe
        .label
        .clone()
        .unwrap_or_else(|| format!("#{index}"));

    if keyframe.label.as_deref().is_some_and(|l| l.trim().is_empty()) {
        return Err(ProjectError::Invalid(format!(
            "keyframe #{index} has an empty label"
        )));
    }

    match &keyframe.source {
        SourceSpec::Solid { width, height, .. } if *width == 0 || *height == 0 => {
            return Err(ProjectError::Invalid(format!(
                "keyframe '{name}' solid source must have a non-zero size"
            )));
        }
        SourceSpec::Frames { frame_rate, extension, .. } => {
            if frame_rate.is_some_and(|rate| !(rate.is_finite() && rate > 0.0)) {
                return Err(ProjectError::Invalid(format!(
                    "keyframe '{name}' frames source frame_rate must be > 0"
                )));
            }
            if extension.trim().is_empty() {
                return Err(ProjectError::Invalid(format!(
                    "keyframe '{name}' frames source extension may not be empty"
                )));
            }
        }
        SourceSpec::Tone { frequency, .. } if !(*frequency > 0.0) => {
            return Err(ProjectError::Invalid(format!(
                "keyframe '{name}' tone frequency must be > 0"
            )));
        }
        SourceSpec::Pcm {
            channels,
            sample_rate,
            ..
        } if *channels == 0 || *sample_rate == 0 => {
            return Err(ProjectError::Invalid(format!(
                "keyframe '{name}' pcm source needs non-zero channels and sample_rate"
            )));
        }
        _ => {}
    }

    for action in &keyframe.actions {
        match action {
            ActionSpec::Hide { label } | ActionSpec::Layer { label, .. }
                if label.trim().is_empty() =>
            {
                return Err(ProjectError::Invalid(format!(
                    "keyframe '{name}' has an action with an empty target label"
                )));
            }
            _ => {}
        }
    }

    for effect in &keyframe.effects {
        match effect {
            EffectSpec::Quad {
                relative_width,
                relative_height,
                ..
            } if *relative_width < 0.0 || *relative_height < 0.0 => {
                return Err(ProjectError::Invalid(format!(
                    "keyframe '{name}' quad relative size must be non-negative"
                )));
            }
            EffectSpec::FadeIn { frames } if *frames == 0 => {
                return Err(ProjectError::Invalid(format!(
                    "keyframe '{name}' fade_in frames must be > 0"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[output]
width = 640
height = 360
clear_intermediate = false

[playback]
start_frame = 30
seek_deadline = "2s"
length = "10s"

[audio]
device = "pipewire"

[[keyframes]]
time = 0
label = "background"
source = { kind = "solid", width = 64, height = 64, rgba = [0, 0, 255, 255] }
actions = [{ kind = "show", layer = 0 }]

[[keyframes.effects]]
kind = "quad"
width = 640
height = 360

[[keyframes.effects]]
kind = "shader"
color = "color.rgb *= 0.5;"
new_pass = true

[[keyframes]]
time = 120
source = { kind = "tone", frequency = 440 }
actions = [{ kind = "hide", label = "background" }, { kind = "clear" }]
effects = [{ kind = "gain", amount = 0.5 }, { kind = "fade_in", frames = 30 }]
"#;

    #[test]
    fn parses_sample_project() {
        let project = ProjectFile::from_toml_str(SAMPLE).expect("parse project");
        assert_eq!(project.version, 1);
        assert_eq!(project.output.width, 640);
        assert_eq!(project.output.frame_rate, 60.0);
        assert_eq!(project.output.sample_rate, 48_000);
        assert!(!project.output.clear_intermediate);
        assert_eq!(project.playback.start_frame, 30);
        assert_eq!(project.playback.seek_deadline, Some(Duration::from_secs(2)));
        assert_eq!(project.length_in_frames(), Some(600));
        assert_eq!(project.audio.device.as_deref(), Some("pipewire"));
        assert_eq!(project.keyframes.len(), 2);

        let background = &project.keyframes[0];
        assert_eq!(background.label.as_deref(), Some("background"));
        assert_eq!(background.source.kind(), "solid");
        assert_eq!(background.actions, vec![ActionSpec::Show { layer: 0 }]);
        assert!(matches!(
            background.effects[1],
            EffectSpec::Shader { new_pass: true, .. }
        ));

        let tone = &project.keyframes[1];
        assert!(matches!(
            tone.source,
            SourceSpec::Tone { frequency, amplitude } if frequency == 440.0 && amplitude == 0.25
        ));
        assert_eq!(tone.actions[1], ActionSpec::Clear);
    }

    #[test]
    fn defaults_match_reference_viewport() {
        let project = ProjectFile::from_toml_str("version = 1\n").unwrap();
        assert_eq!(project.output, OutputSettings::default());
        assert_eq!((project.output.width, project.output.height), (1280, 720));
        assert_eq!(project.output.clear_color, [0.1, 0.2, 0.2, 1.0]);
        assert_eq!(project.camera.x, -640.0);
        assert_eq!(project.camera.z, -360.0);
        assert_eq!(project.camera.fov, 90.0);
        assert_eq!(project.playback.seek_deadline, Some(Duration::from_secs(5)));
        assert!(project.audio.enabled);
        assert!(project.keyframes.is_empty());
    }

    #[test]
    fn seek_deadline_can_be_disabled() {
        let project = ProjectFile::from_toml_str(
            r#"
version = 1

[playback]
seek_deadline = "off"
"#,
        )
        .unwrap();
        assert_eq!(project.playback.seek_deadline, None);
    }

    #[test]
    fn rejects_unknown_version() {
        let err = ProjectFile::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ProjectError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_output_size() {
        let err = ProjectFile::from_toml_str(
            r#"
version = 1

[output]
width = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_operator_kind() {
        let err = ProjectFile::from_toml_str(
            r#"
version = 1

[[keyframes]]
time = 0
source = { kind = "hologram" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::Parse(_)));
    }

    #[test]
    fn rejects_empty_hide_label() {
        let err = ProjectFile::from_toml_str(
            r#"
version = 1

[[keyframes]]
time = 10
source = { kind = "solid", width = 4, height = 4 }
actions = [{ kind = "hide", label = " " }]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::Invalid(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ProjectFile::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ProjectError::Io { .. }));
    }
}
