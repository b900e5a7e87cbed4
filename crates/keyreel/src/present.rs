use std::path::{Path, PathBuf};

use anyhow::Result;
use renderer::{Frame, PresentationSink};

/// Keeps the most recent frame so it can be written out as a PNG when
/// playback ends.
pub struct PngSnapshotSink {
    path: Option<PathBuf>,
    latest_index: Option<i64>,
    latest: Option<Frame>,
    presented: u64,
    last_level: f32,
}

impl PngSnapshotSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            latest_index: None,
            latest: None,
            presented: 0,
            last_level: 0.0,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn latest_frame_index(&self) -> Option<i64> {
        self.latest_index
    }

    /// Writes the latest frame, if a path was configured and anything was
    /// presented.
    pub fn write_snapshot(&self) -> Result<Option<&Path>> {
        let (Some(path), Some(frame)) = (self.path.as_deref(), self.latest.as_ref()) else {
            return Ok(None);
        };
        frame.save_png(path)?;
        tracing::debug!(frame = ?self.latest_index, path = %path.display(), "snapshot saved");
        Ok(Some(path))
    }
}

impl PresentationSink for PngSnapshotSink {
    fn present(&mut self, frame_index: i64, frame: &Frame) {
        self.presented += 1;
        self.latest_index = Some(frame_index);
        if self.path.is_some() {
            self.latest = Some(frame.clone());
        }
    }

    fn spectrum(&mut self, _magnitudes: &[f32], level: f32) {
        if (level - self.last_level).abs() > 0.05 {
            tracing::trace!(level, "spectrum level");
        }
        self.last_level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_the_latest_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.png");
        let mut sink = PngSnapshotSink::new(Some(path.clone()));
        sink.present(3, &Frame::solid(2, 2, [0.0, 0.0, 1.0, 1.0]));
        sink.present(4, &Frame::solid(2, 2, [1.0, 0.0, 0.0, 1.0]));

        assert_eq!(sink.presented(), 2);
        assert_eq!(sink.latest_frame_index(), Some(4));
        assert_eq!(sink.write_snapshot().unwrap(), Some(path.as_path()));

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn nothing_to_write_without_a_path() {
        let mut sink = PngSnapshotSink::new(None);
        sink.present(0, &Frame::solid(4, 4, [1.0; 4]));
        assert!(sink.write_snapshot().unwrap().is_none());
    }
}
