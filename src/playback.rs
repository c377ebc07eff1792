/// Playhead over a loaded track, advanced by the render loop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Playback {
    position: f64,
    duration: f64,
    playing: bool,
    ended: bool,
}

impl Playback {
    pub fn new(duration: f64) -> Self {
        let duration = if duration.is_finite() {
            duration.max(0.0)
        } else {
            0.0
        };
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn is_loaded(&self) -> bool {
        self.duration > 0.0
    }

    /// Starts playback; an ended track restarts from the beginning.
    pub fn play(&mut self) -> bool {
        if !self.is_loaded() {
            return false;
        }
        if self.ended {
            self.position = 0.0;
            self.ended = false;
        }
        self.playing = true;
        true
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn seek(&mut self, time: f64) {
        let time = if time.is_finite() { time } else { 0.0 };
        self.position = time.clamp(0.0, self.duration);
        self.ended = false;
    }

    /// Moves the playhead by `dt` seconds while playing. Returns true on the
    /// tick that reaches the end.
    pub fn advance(&mut self, dt: f64) -> bool {
        if !self.playing || !dt.is_finite() || dt <= 0.0 {
            return false;
        }
        self.position += dt;
        if self.position >= self.duration {
            self.position = self.duration;
            self.playing = false;
            self.ended = true;
            return true;
        }
        false
    }
}
