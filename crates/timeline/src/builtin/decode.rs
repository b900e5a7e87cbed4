//! Narrow decode interfaces: one frame at an index, one audio block at a
//! sample position. Container formats live outside keyreel; these readers
//! cover numbered image sequences and raw `f32le` sample files.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;

use crate::ops::{AudioChunk, OperatorError};

pub trait FrameDecoder: Send {
    fn frame_count(&self) -> u64;

    fn decode_at(&mut self, index: u64) -> Result<Arc<RgbaImage>, OperatorError>;

    /// Position the decoder at `index`, warming whatever cache it keeps.
    fn seek(&mut self, index: u64) -> Result<(), OperatorError> {
        self.decode_at(index).map(|_| ())
    }
}

pub trait AudioReader: Send {
    fn channels(&self) -> u16;

    fn sample_rate(&self) -> u32;

    /// Up to `len` sample frames starting at `start`. Positions before the
    /// clip read as silence; the chunk is short once the clip runs out.
    fn read_block(&mut self, start: i64, len: usize) -> Result<AudioChunk, OperatorError>;

    fn seek(&mut self, start: i64) -> Result<(), OperatorError>;
}

/// Decodes `<directory>/*.<extension>` in numeric filename order. Indices past
/// the last file hold the last frame.
pub struct ImageSequenceDecoder {
    files: Vec<PathBuf>,
    current: Option<(u64, Arc<RgbaImage>)>,
}

impl ImageSequenceDecoder {
    pub fn open(directory: &Path, extension: &str) -> Result<Self, OperatorError> {
        let entries = std::fs::read_dir(directory).map_err(|source| OperatorError::Io {
            operator: "frames",
            path: directory.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            })
            .collect();
        if files.is_empty() {
            return Err(OperatorError::failed(
                "frames",
                format!("no .{extension} files in {}", directory.display()),
            ));
        }
        files.sort_by_cached_key(|path| sequence_key(path));
        tracing::debug!(
            directory = %directory.display(),
            frames = files.len(),
            "opened image sequence"
        );
        Ok(Self {
            files,
            current: None,
        })
    }
}

/// Sort by the trailing number in the file stem, then by name, so that
/// `frame9` comes before `frame10`.
fn sequence_key(path: &Path) -> (Option<u64>, String) {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let digits: String = stem
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    (digits.parse().ok(), stem.to_string())
}

impl FrameDecoder for ImageSequenceDecoder {
    fn frame_count(&self) -> u64 {
        self.files.len() as u64
    }

    fn decode_at(&mut self, index: u64) -> Result<Arc<RgbaImage>, OperatorError> {
        let index = index.min(self.frame_count().saturating_sub(1));
        if let Some((cached, image)) = &self.current {
            if *cached == index {
                return Ok(image.clone());
            }
        }
        let path = &self.files[index as usize];
        let image = image::open(path)
            .map_err(|source| OperatorError::Image {
                operator: "frames",
                path: path.clone(),
                source,
            })?
            .into_rgba8();
        let image = Arc::new(image);
        self.current = Some((index, image.clone()));
        Ok(image)
    }
}

const BYTES_PER_SAMPLE: u64 = 4;

/// Interleaved little-endian `f32` samples without a header.
pub struct PcmFileReader {
    path: PathBuf,
    reader: BufReader<File>,
    channels: u16,
    sample_rate: u32,
    total_frames: u64,
    /// Frame the file cursor sits at; `None` after a failed read.
    position: Option<u64>,
}

impl PcmFileReader {
    pub fn open(path: &Path, channels: u16, sample_rate: u32) -> Result<Self, OperatorError> {
        if channels == 0 {
            return Err(OperatorError::failed("pcm", "channel count must be at least 1"));
        }
        let io_error = |source| OperatorError::Io {
            operator: "pcm",
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_error)?;
        let bytes = file.metadata().map_err(io_error)?.len();
        let frame_bytes = BYTES_PER_SAMPLE * channels as u64;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            channels,
            sample_rate,
            total_frames: bytes / frame_bytes,
            position: Some(0),
        })
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn io_error(&self, source: std::io::Error) -> OperatorError {
        OperatorError::Io {
            operator: "pcm",
            path: self.path.clone(),
            source,
        }
    }

    fn seek_to(&mut self, frame: u64) -> Result<(), OperatorError> {
        if self.position == Some(frame) {
            return Ok(());
        }
        let offset = frame * BYTES_PER_SAMPLE * self.channels as u64;
        self.position = None;
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|err| self.io_error(err))?;
        self.position = Some(frame);
        Ok(())
    }
}

impl AudioReader for PcmFileReader {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, start: i64, len: usize) -> Result<AudioChunk, OperatorError> {
        let channels = self.channels as usize;
        let mut chunk = AudioChunk {
            sample_rate: self.sample_rate,
            channels: vec![Vec::with_capacity(len); channels],
        };
        let end = start.saturating_add(len as i64);

        let leading = (end.min(0) - start.min(0)).max(0) as usize;
        for channel in &mut chunk.channels {
            channel.resize(leading, 0.0);
        }

        let first = start.max(0) as u64;
        let last = (end.max(0) as u64).min(self.total_frames);
        if first >= last {
            return Ok(chunk);
        }

        self.seek_to(first)?;
        let frames = (last - first) as usize;
        let mut bytes = vec![0u8; frames * channels * BYTES_PER_SAMPLE as usize];
        if let Err(err) = self.reader.read_exact(&mut bytes) {
            self.position = None;
            return Err(self.io_error(err));
        }
        self.position = Some(last);

        for (index, sample) in bytes.chunks_exact(BYTES_PER_SAMPLE as usize).enumerate() {
            let value = f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
            chunk.channels[index % channels].push(value);
        }
        Ok(chunk)
    }

    fn seek(&mut self, start: i64) -> Result<(), OperatorError> {
        let frame = (start.max(0) as u64).min(self.total_frames);
        self.seek_to(frame)
    }
}
