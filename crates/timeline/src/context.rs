use projectfile::OutputSettings;

/// Frame ticks per second of the reference clock.
pub const TICKS_PER_SECOND: f64 = 60.0;

/// Engine-wide values every operator may read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineContext {
    pub output_width: u32,
    pub output_height: u32,
    pub frame_rate: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Mean spectrum magnitude of the most recent audio history.
    pub spectrum_level: f32,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            output_width: 1280,
            output_height: 720,
            frame_rate: TICKS_PER_SECOND,
            sample_rate: 48_000,
            channels: 2,
            spectrum_level: 0.0,
        }
    }
}

impl EngineContext {
    pub fn from_output(output: &OutputSettings) -> Self {
        Self {
            output_width: output.width,
            output_height: output.height,
            frame_rate: output.frame_rate,
            sample_rate: output.sample_rate,
            channels: output.channels,
            spectrum_level: 0.0,
        }
    }

    /// First sample that belongs to `frame`: `floor(frame / frame_rate * sample_rate)`.
    pub fn sample_anchor(&self, frame: i64) -> i64 {
        (frame as f64 * self.sample_rate as f64 / self.frame_rate).floor() as i64
    }

    /// Frame that is on screen while `sample` plays.
    pub fn frame_at_sample(&self, sample: i64) -> i64 {
        (sample as f64 * self.frame_rate / self.sample_rate as f64).floor() as i64
    }
}

/// A possibly fractional position on the frame clock.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct FrameTime(pub f64);

impl FrameTime {
    pub fn from_seconds(seconds: f64, frame_rate: f64) -> Self {
        FrameTime(seconds * frame_rate)
    }

    /// Integer tick used for state evaluation. Fractions round toward
    /// negative infinity, so `74.9` evaluates as `74` and `-0.5` as `-1`.
    pub fn to_tick(self) -> i64 {
        self.0.floor() as i64
    }
}

impl From<i64> for FrameTime {
    fn from(frame: i64) -> Self {
        FrameTime(frame as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_frames_floor() {
        assert_eq!(FrameTime(74.999).to_tick(), 74);
        assert_eq!(FrameTime(75.0).to_tick(), 75);
        assert_eq!(FrameTime(-0.5).to_tick(), -1);
        assert_eq!(FrameTime::from_seconds(1.25, 60.0).to_tick(), 75);
    }

    #[test]
    fn sample_anchor_is_exact_on_frame_boundaries() {
        let ctx = EngineContext::default();
        assert_eq!(ctx.sample_anchor(0), 0);
        assert_eq!(ctx.sample_anchor(1), 800);
        assert_eq!(ctx.sample_anchor(50), 40_000);
        assert_eq!(ctx.sample_anchor(60), 48_000);
        assert_eq!(ctx.frame_at_sample(40_799), 50);
        assert_eq!(ctx.frame_at_sample(40_800), 51);
    }

    #[test]
    fn sample_anchor_floors_for_odd_rates() {
        let ctx = EngineContext {
            frame_rate: 24.0,
            sample_rate: 44_100,
            ..EngineContext::default()
        };
        // 1 / 24 * 44100 = 1837.5
        assert_eq!(ctx.sample_anchor(1), 1837);
        assert_eq!(ctx.sample_anchor(-1), -1838);
    }
}
