use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

use super::decode::{AudioReader, FrameDecoder};
use crate::context::EngineContext;
use crate::ops::{AudioChunk, AudioSource, ImageSource, OperatorError, Seekable, Source};

pub struct SolidSource {
    image: Arc<RgbaImage>,
}

impl SolidSource {
    pub fn new(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            image: Arc::new(RgbaImage::from_pixel(
                width.max(1),
                height.max(1),
                Rgba(rgba),
            )),
        }
    }
}

impl Source for SolidSource {
    fn name(&self) -> &'static str {
        "solid"
    }

    fn image_source(&self) -> Option<&dyn ImageSource> {
        Some(self)
    }
}

impl ImageSource for SolidSource {
    fn image(&self, _ctx: &EngineContext, _relative_frame: i64) -> Result<Arc<RgbaImage>, OperatorError> {
        Ok(self.image.clone())
    }
}

/// A still image decoded once at load.
pub struct ImageFileSource {
    path: PathBuf,
    image: Arc<RgbaImage>,
}

impl ImageFileSource {
    pub fn open(path: &Path) -> Result<Self, OperatorError> {
        let image = image::open(path)
            .map_err(|source| OperatorError::Image {
                operator: "image",
                path: path.to_path_buf(),
                source,
            })?
            .into_rgba8();
        Ok(Self {
            path: path.to_path_buf(),
            image: Arc::new(image),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for ImageFileSource {
    fn name(&self) -> &'static str {
        "image"
    }

    fn image_source(&self) -> Option<&dyn ImageSource> {
        Some(self)
    }
}

impl ImageSource for ImageFileSource {
    fn image(&self, _ctx: &EngineContext, _relative_frame: i64) -> Result<Arc<RgbaImage>, OperatorError> {
        Ok(self.image.clone())
    }
}

/// Video-like source backed by a [`FrameDecoder`].
pub struct FrameSequenceSource {
    decoder: Mutex<Box<dyn FrameDecoder>>,
    frame_rate: Option<f64>,
}

impl FrameSequenceSource {
    /// `frame_rate` is the sequence's own rate; `None` plays one decoded
    /// frame per output frame.
    pub fn new(decoder: Box<dyn FrameDecoder>, frame_rate: Option<f64>) -> Self {
        Self {
            decoder: Mutex::new(decoder),
            frame_rate,
        }
    }

    fn decoder_index(&self, ctx: &EngineContext, relative_frame: i64) -> u64 {
        if relative_frame <= 0 {
            return 0;
        }
        let rate = self.frame_rate.unwrap_or(ctx.frame_rate);
        (relative_frame as f64 * rate / ctx.frame_rate).floor() as u64
    }
}

impl Source for FrameSequenceSource {
    fn name(&self) -> &'static str {
        "frames"
    }

    fn image_source(&self) -> Option<&dyn ImageSource> {
        Some(self)
    }

    fn seekable(&self) -> Option<&dyn Seekable> {
        Some(self)
    }
}

impl ImageSource for FrameSequenceSource {
    fn image(&self, ctx: &EngineContext, relative_frame: i64) -> Result<Arc<RgbaImage>, OperatorError> {
        let index = self.decoder_index(ctx, relative_frame);
        self.decoder.lock().decode_at(index)
    }
}

impl Seekable for FrameSequenceSource {
    fn seek(&self, ctx: &EngineContext, relative_frame: i64) -> Result<(), OperatorError> {
        let index = self.decoder_index(ctx, relative_frame);
        self.decoder.lock().seek(index)
    }
}

/// Mono sine generator.
pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
}

impl ToneSource {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
        }
    }
}

impl Source for ToneSource {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn audio_source(&self) -> Option<&dyn AudioSource> {
        Some(self)
    }
}

impl AudioSource for ToneSource {
    fn audio(
        &self,
        ctx: &EngineContext,
        relative_sample: i64,
        len: usize,
    ) -> Result<AudioChunk, OperatorError> {
        let step = TAU * self.frequency as f64 / ctx.sample_rate as f64;
        let amplitude = self.amplitude as f64;
        let samples = (0..len as i64)
            .map(|offset| {
                let n = relative_sample + offset;
                if n < 0 {
                    0.0
                } else {
                    (amplitude * (step * n as f64).sin()) as f32
                }
            })
            .collect();
        Ok(AudioChunk::mono(samples, ctx.sample_rate))
    }
}

/// Audio clip backed by an [`AudioReader`].
pub struct PcmSource {
    reader: Mutex<Box<dyn AudioReader>>,
}

impl PcmSource {
    pub fn new(reader: Box<dyn AudioReader>) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

impl Source for PcmSource {
    fn name(&self) -> &'static str {
        "pcm"
    }

    fn audio_source(&self) -> Option<&dyn AudioSource> {
        Some(self)
    }

    fn seekable(&self) -> Option<&dyn Seekable> {
        Some(self)
    }
}

impl AudioSource for PcmSource {
    fn audio(
        &self,
        _ctx: &EngineContext,
        relative_sample: i64,
        len: usize,
    ) -> Result<AudioChunk, OperatorError> {
        self.reader.lock().read_block(relative_sample, len)
    }
}

impl Seekable for PcmSource {
    fn seek(&self, ctx: &EngineContext, relative_frame: i64) -> Result<(), OperatorError> {
        self.reader.lock().seek(ctx.sample_anchor(relative_frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDecoder {
        decoded: Arc<Mutex<Vec<u64>>>,
    }

    impl FrameDecoder for CountingDecoder {
        fn frame_count(&self) -> u64 {
            1_000
        }

        fn decode_at(&mut self, index: u64) -> Result<Arc<RgbaImage>, OperatorError> {
            self.decoded.lock().push(index);
            Ok(Arc::new(RgbaImage::new(1, 1)))
        }
    }

    fn counted_sequence(frame_rate: Option<f64>) -> (FrameSequenceSource, Arc<Mutex<Vec<u64>>>) {
        let decoded = Arc::new(Mutex::new(Vec::new()));
        let source = FrameSequenceSource::new(
            Box::new(CountingDecoder {
                decoded: Arc::clone(&decoded),
            }),
            frame_rate,
        );
        (source, decoded)
    }

    #[test]
    fn sequence_maps_output_frames_to_source_rate() {
        let (source, decoded) = counted_sequence(Some(30.0));
        let ctx = EngineContext::default();
        source.image(&ctx, -4).unwrap();
        source.image(&ctx, 1).unwrap();
        source.image(&ctx, 2).unwrap();
        source.image(&ctx, 61).unwrap();
        source.seek(&ctx, 120).unwrap();
        source.image(&ctx, 121).unwrap();
        assert_eq!(*decoded.lock(), vec![0, 0, 1, 30, 60, 60]);
    }

    #[test]
    fn sequence_floors_at_non_integer_rate_ratios() {
        let (source, decoded) = counted_sequence(Some(24.0));
        let ctx = EngineContext::default();
        for frame in [3, 5, 7, 8, 149] {
            source.image(&ctx, frame).unwrap();
        }
        // 60 Hz output over a 24 Hz sequence: 1.2, 2.0, 2.8, 3.2, 59.6.
        assert_eq!(*decoded.lock(), vec![1, 2, 2, 3, 59]);
    }

    #[test]
    fn sequence_without_rate_plays_one_frame_per_tick() {
        let (source, decoded) = counted_sequence(None);
        let ctx = EngineContext::default();
        for frame in 0..3 {
            source.image(&ctx, frame).unwrap();
        }
        assert_eq!(*decoded.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn tone_is_silent_before_its_start() {
        let tone = ToneSource::new(440.0, 1.0);
        let chunk = tone.audio(&EngineContext::default(), -4, 8).unwrap();
        assert_eq!(chunk.channel_count(), 1);
        assert!(chunk.channels[0][..5].iter().all(|s| *s == 0.0));
        assert!(chunk.channels[0][5] > 0.0);
    }

    #[test]
    fn solid_source_is_shared() {
        let solid = SolidSource::new(3, 2, [1, 2, 3, 4]);
        let ctx = EngineContext::default();
        let a = solid.image(&ctx, 0).unwrap();
        let b = solid.image(&ctx, 500).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.dimensions(), (3, 2));
    }
}
