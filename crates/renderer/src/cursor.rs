use std::time::Instant;

use timeline::EngineContext;

/// Playback position.
///
/// While playing the frame is derived from the wall clock,
/// `frame_anchor + elapsed * frame_rate`, and never stored directly. While
/// stopped the stored frame is the only source of truth.
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    ctx: EngineContext,
    frame: f64,
    playing: bool,
    seeking: bool,
    anchor: Instant,
    frame_anchor: f64,
}

impl PlaybackCursor {
    pub fn new(ctx: EngineContext, start_frame: i64, now: Instant) -> Self {
        Self {
            ctx,
            frame: start_frame as f64,
            playing: false,
            seeking: false,
            anchor: now,
            frame_anchor: start_frame as f64,
        }
    }

    pub fn current_frame(&self, now: Instant) -> f64 {
        if self.playing {
            let elapsed = now.saturating_duration_since(self.anchor);
            self.frame_anchor + elapsed.as_secs_f64() * self.ctx.frame_rate
        } else {
            self.frame
        }
    }

    /// Integer frame shown at `now`.
    pub fn frame(&self, now: Instant) -> i64 {
        self.current_frame(now).floor() as i64
    }

    /// First sample of the frame shown at `now`.
    pub fn sample(&self, now: Instant) -> i64 {
        self.ctx.sample_anchor(self.frame(now))
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking
    }

    pub fn set_seeking(&mut self, seeking: bool) {
        self.seeking = seeking;
    }

    pub fn play(&mut self, now: Instant) {
        if self.playing {
            return;
        }
        self.frame_anchor = self.frame;
        self.anchor = now;
        self.playing = true;
    }

    pub fn pause(&mut self, now: Instant) {
        if !self.playing {
            return;
        }
        self.frame = self.current_frame(now);
        self.playing = false;
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.playing {
            self.pause(now);
        } else {
            self.play(now);
        }
    }

    /// Moves to `frame` immediately, re-anchoring the clock when playing.
    pub fn jump(&mut self, frame: i64, now: Instant) {
        self.frame = frame as f64;
        self.frame_anchor = frame as f64;
        self.anchor = now;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn cursor(start: i64, now: Instant) -> PlaybackCursor {
        PlaybackCursor::new(EngineContext::default(), start, now)
    }

    #[test]
    fn stopped_cursor_ignores_the_clock() {
        let now = Instant::now();
        let cursor = cursor(10, now);
        assert_eq!(cursor.frame(now + Duration::from_secs(3)), 10);
        assert_eq!(cursor.sample(now), 8_000);
    }

    #[test]
    fn playing_cursor_follows_the_clock() {
        let now = Instant::now();
        let mut cursor = cursor(10, now);
        cursor.play(now);
        assert_eq!(cursor.frame(now + Duration::from_millis(500)), 40);

        cursor.pause(now + Duration::from_millis(500));
        assert!(!cursor.is_playing());
        assert_eq!(cursor.frame(now + Duration::from_secs(10)), 40);
    }

    #[test]
    fn jump_reanchors_while_playing() {
        let now = Instant::now();
        let mut cursor = cursor(0, now);
        cursor.play(now);
        let later = now + Duration::from_secs(1);
        cursor.jump(300, later);
        assert_eq!(cursor.frame(later), 300);
        assert_eq!(cursor.frame(later + Duration::from_millis(250)), 315);
    }

    #[test]
    fn toggle_round_trips() {
        let now = Instant::now();
        let mut cursor = cursor(5, now);
        cursor.toggle(now);
        assert!(cursor.is_playing());
        cursor.toggle(now + Duration::from_secs(1));
        assert_eq!(cursor.frame(now + Duration::from_secs(5)), 65);
    }
}
