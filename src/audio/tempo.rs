use std::time::Instant;

/// Tempo in whole beats per minute, always within [`Tempo::MIN`, `Tempo::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tempo(u32);

impl Tempo {
    pub const MIN: u32 = 30;
    pub const MAX: u32 = 300;

    pub fn new(bpm: u32) -> Self {
        Self(bpm.clamp(Self::MIN, Self::MAX))
    }

    /// Rounds and clamps a fractional BPM, e.g. from tap tempo.
    pub fn from_f64(bpm: f64) -> Self {
        if bpm.is_nan() {
            return Self::default();
        }
        Self(bpm.round().clamp(Self::MIN as f64, Self::MAX as f64) as u32)
    }

    pub fn bpm(self) -> u32 {
        self.0
    }

    pub fn seconds_per_beat(self) -> f64 {
        60.0 / self.0 as f64
    }

    pub fn nudge(self, delta: i32) -> Self {
        Self::new(self.0.saturating_add_signed(delta))
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(120)
    }
}

/// Averages the last few taps into a tempo.
#[derive(Debug, Clone, Default)]
pub struct TapTempo {
    tap_times: Vec<Instant>,
}

impl TapTempo {
    const MAX_TAPS: usize = 4;

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap and return the averaged tempo once two taps line up.
    pub fn tap(&mut self, now: Instant) -> Option<Tempo> {
        let Some(&last_tap) = self.tap_times.last() else {
            self.tap_times.push(now);
            return None;
        };

        let elapsed = now.duration_since(last_tap).as_secs_f64();
        let shortest = 60.0 / Tempo::MAX as f64;
        let longest = 60.0 / Tempo::MIN as f64;

        if !(shortest..=longest).contains(&elapsed) {
            // Too long (or too short) between taps, start over
            self.tap_times.clear();
            self.tap_times.push(now);
            return None;
        }

        self.tap_times.push(now);
        if self.tap_times.len() > Self::MAX_TAPS {
            self.tap_times.remove(0);
        }

        let first = self.tap_times[0];
        let total_time = now.duration_since(first).as_secs_f64();
        let intervals = (self.tap_times.len() - 1) as f64;
        Some(Tempo::from_f64(60.0 / (total_time / intervals)))
    }

    pub fn reset(&mut self) {
        self.tap_times.clear();
    }
}
