use std::collections::VecDeque;

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use tracing::{error, info, warn};

use super::feed::AudioFeed;

/// Names of the output devices on the default host.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();
    for device in host.output_devices().context("failed to enumerate audio devices")? {
        devices.push(device.name().unwrap_or_else(|_| "unknown".to_string()));
    }
    Ok(devices)
}

/// A running cpal output stream pulling blocks from an [`AudioFeed`].
///
/// The stream stops when this is dropped.
pub struct AudioOutput {
    stream: cpal::Stream,
    device_name: String,
}

impl AudioOutput {
    /// Opens `device_name` (or the default device) at the feed's sample
    /// rate and channel count and starts playback.
    pub fn start(device_name: Option<&str>, feed: AudioFeed) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .context("failed to enumerate audio devices")?
                .find(|device| device.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("audio device '{name}' not found"))?,
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow!("no default audio output device"))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let config = cpal::StreamConfig {
            channels: feed.channels(),
            sample_rate: cpal::SampleRate(feed.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let sample_format = device
            .default_output_config()
            .map(|supported| supported.sample_format())
            .unwrap_or(SampleFormat::F32);
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, feed),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, feed),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, feed),
            other => bail!("unsupported sample format {other:?} on '{device_name}'"),
        }
        .with_context(|| format!("failed to open audio stream on '{device_name}'"))?;
        stream
            .play()
            .with_context(|| format!("failed to start audio stream on '{device_name}'"))?;

        info!(
            device = %device_name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?sample_format,
            "audio output started"
        );
        Ok(Self {
            stream,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut feed: AudioFeed,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut pending: VecDeque<f32> = VecDeque::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            fill_buffer(data, &mut pending, || feed.next_block().interleaved());
        },
        move |err| error!(error = %err, "audio stream error"),
        None,
    )
}

/// Copies mixed samples into a device buffer of any sample type, pulling
/// whole blocks as needed. Device buffers rarely line up with mix blocks.
fn fill_buffer<T>(
    data: &mut [T],
    pending: &mut VecDeque<f32>,
    mut next_block: impl FnMut() -> Vec<f32>,
) where
    T: SizedSample + FromSample<f32>,
{
    let len = data.len();
    while pending.len() < len {
        pending.extend(next_block());
    }
    for (out, sample) in data.iter_mut().zip(pending.drain(..len)) {
        *out = T::from_sample(sample);
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        if let Err(err) = self.stream.pause() {
            warn!(error = %err, "failed to pause audio stream");
        }
    }
}
