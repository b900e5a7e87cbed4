use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One `[[keyframes]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeyframeSpec {
    pub time: i64,
    #[serde(default)]
    pub label: Option<String>,
    pub source: SourceSpec,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Solid {
        width: u32,
        height: u32,
        #[serde(default = "default_rgba")]
        rgba: [u8; 4],
    },
    Image {
        path: PathBuf,
    },
    Frames {
        directory: PathBuf,
        #[serde(default = "default_extension")]
        extension: String,
        /// Frames per second of the sequence; the output frame rate when unset.
        #[serde(default)]
        frame_rate: Option<f64>,
    },
    Tone {
        frequency: f32,
        #[serde(default = "default_amplitude")]
        amplitude: f32,
    },
    Pcm {
        path: PathBuf,
        #[serde(default = "default_pcm_channels")]
        channels: u16,
        sample_rate: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    Show {
        #[serde(default)]
        layer: i32,
    },
    Hide {
        label: String,
    },
    Clear,
    Layer {
        label: String,
        layer: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectSpec {
    Quad {
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
        #[serde(default)]
        z: f32,
        /// Pixel width; the source image width when unset.
        #[serde(default)]
        width: Option<f32>,
        #[serde(default)]
        height: Option<f32>,
        /// Degrees around the view axis.
        #[serde(default)]
        rotation: f32,
        #[serde(default = "default_percent")]
        relative_width: f32,
        #[serde(default = "default_percent")]
        relative_height: f32,
    },
    Shader {
        #[serde(default)]
        declarations: String,
        #[serde(default)]
        uv: String,
        #[serde(default)]
        color: String,
        #[serde(default)]
        new_pass: bool,
    },
    Gain {
        amount: f32,
    },
    FadeIn {
        frames: u32,
    },
}

impl SourceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceSpec::Solid { .. } => "solid",
            SourceSpec::Image { .. } => "image",
            SourceSpec::Frames { .. } => "frames",
            SourceSpec::Tone { .. } => "tone",
            SourceSpec::Pcm { .. } => "pcm",
        }
    }
}

fn default_rgba() -> [u8; 4] {
    [255, 255, 255, 255]
}

fn default_extension() -> String {
    "png".to_string()
}

fn default_amplitude() -> f32 {
    0.25
}

fn default_pcm_channels() -> u16 {
    2
}

fn default_percent() -> f32 {
    100.0
}
