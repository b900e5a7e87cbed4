use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use image::RgbaImage;
use projectfile::{CameraSettings, ProjectFile};
use timeline::EngineContext;

/// Everything the engine needs from the project file, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub output_size: (u32, u32),
    pub frame_rate: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub clear_color: [f32; 4],
    /// Clear intermediate targets before each pass instead of loading them.
    pub clear_intermediate: bool,
    pub camera: CameraParams,
    pub start_frame: i64,
    /// How long a stopped-state seek may run before the coordinator gives up
    /// waiting. `None` waits forever.
    pub seek_deadline: Option<Duration>,
    pub audio_enabled: bool,
    pub audio_device: Option<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            output_size: (1280, 720),
            frame_rate: 60.0,
            sample_rate: 48_000,
            channels: 2,
            clear_color: [0.1, 0.2, 0.2, 1.0],
            clear_intermediate: true,
            camera: CameraParams::default(),
            start_frame: 0,
            seek_deadline: Some(Duration::from_secs(5)),
            audio_enabled: true,
            audio_device: None,
        }
    }
}

impl RendererConfig {
    pub fn from_project(project: &ProjectFile) -> Self {
        let output = &project.output;
        Self {
            output_size: (output.width, output.height),
            frame_rate: output.frame_rate,
            sample_rate: output.sample_rate,
            channels: output.channels,
            clear_color: output.clear_color,
            clear_intermediate: output.clear_intermediate,
            camera: CameraParams::from(&project.camera),
            start_frame: project.playback.start_frame,
            seek_deadline: project.playback.seek_deadline,
            audio_enabled: project.audio.enabled,
            audio_device: project.audio.device.clone(),
        }
    }

    pub fn engine_context(&self) -> EngineContext {
        EngineContext {
            output_width: self.output_size.0,
            output_height: self.output_size.1,
            frame_rate: self.frame_rate,
            sample_rate: self.sample_rate,
            channels: self.channels,
            spectrum_level: 0.0,
        }
    }
}

/// Camera pose in output pixel space. Angles are degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub fov: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self::from(&CameraSettings::default())
    }
}

impl From<&CameraSettings> for CameraParams {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            x: settings.x,
            y: settings.y,
            z: settings.z,
            pitch: settings.pitch,
            yaw: settings.yaw,
            roll: settings.roll,
            fov: settings.fov,
        }
    }
}

/// A composited output image, tightly packed RGBA8 with the top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Frame {
    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, color: [f32; 4]) -> Self {
        let pixel = color.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8);
        let rgba = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let image = self
            .to_image()
            .context("frame buffer does not match its dimensions")?;
        image
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}
