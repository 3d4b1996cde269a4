//! Lookahead beat scheduling.
//!
//! The event loop wakes the scheduler every `poll_interval_ms`. Each pass
//! commits every beat that falls inside `now + lookahead` to the audio clock
//! with its exact timestamp, so jitter in the wake-ups never reaches the
//! audible output.

use std::time::Duration;

use log::{trace, warn};
use serde::Deserialize;

use super::clock::AudioClock;
use super::tempo::Tempo;
use super::tone;
use super::Sounds;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub lookahead_ms: u64,
    pub poll_interval_ms: u64,
    /// Most beats one pass may emit; older overdue beats are skipped
    /// silently. Must fit in the audio tone queue.
    pub max_catch_up_beats: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 100,
            poll_interval_ms: 25,
            max_catch_up_beats: 16,
        }
    }
}

impl SchedulerConfig {
    pub fn lookahead(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub emitted: usize,
    pub skipped: u64,
}

/// Timeline state for the beat loop, owned by the playback controller.
#[derive(Debug, Clone)]
pub struct BeatScheduler {
    pub tempo: Tempo,
    meter: u32,
    pub accent_enabled: bool,
    pub sounds: Sounds,
    config: SchedulerConfig,
    current_beat: usize,
    next_event_time: f64,
}

impl BeatScheduler {
    pub fn new(
        tempo: Tempo,
        meter: u32,
        accent_enabled: bool,
        sounds: Sounds,
        config: SchedulerConfig,
    ) -> Self {
        assert!(meter > 0, "meter must be at least one beat");
        Self {
            tempo,
            meter,
            accent_enabled,
            sounds,
            config,
            current_beat: meter as usize - 1,
            next_event_time: 0.0,
        }
    }

    pub fn meter(&self) -> u32 {
        self.meter
    }

    pub fn current_beat(&self) -> usize {
        self.current_beat
    }

    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Change the meter. The beat counter is parked on the last beat so the
    /// next scheduled beat is a downbeat.
    pub fn set_meter(&mut self, meter: u32) {
        assert!(meter > 0, "meter must be at least one beat");
        self.meter = meter;
        self.current_beat = meter as usize - 1;
    }

    /// Restart the timeline at `clock_time` with the downbeat due next.
    pub fn reset(&mut self, clock_time: f64) {
        self.current_beat = self.meter as usize - 1;
        self.next_event_time = clock_time;
    }

    /// Emit every beat due before `now + lookahead`.
    pub fn tick<C: AudioClock + ?Sized>(&mut self, now: f64, clock: &mut C) -> Result<TickReport> {
        let horizon = now + self.config.lookahead();
        let cap = self.config.max_catch_up_beats.max(1) as u64;
        let mut report = TickReport::default();

        if self.next_event_time < horizon {
            let seconds_per_beat = self.tempo.seconds_per_beat();
            let pending = ((horizon - self.next_event_time) / seconds_per_beat).ceil() as u64;
            if pending > cap {
                let skip = pending - cap;
                self.next_event_time += skip as f64 * seconds_per_beat;
                self.current_beat =
                    ((self.current_beat as u64 + skip) % self.meter as u64) as usize;
                report.skipped = skip;
                warn!(
                    "scheduler fell {} beats behind, skipped {} to resume at {:.3}s",
                    pending, skip, self.next_event_time
                );
            }
        }

        while self.next_event_time < horizon && (report.emitted as u64) < cap {
            let beat = (self.current_beat + 1) % self.meter as usize;
            let tone = tone::emit(
                clock,
                beat,
                &self.sounds,
                self.accent_enabled,
                self.next_event_time,
            )?;
            self.current_beat = beat;
            trace!(
                "beat {} at {:.4}s ({} Hz{})",
                tone.beat,
                tone.start,
                tone.frequency,
                if tone.accented { ", accent" } else { "" }
            );
            report.emitted += 1;

            // Read at emission time so a tempo change lands on the next beat
            self.next_event_time += self.tempo.seconds_per_beat();
        }

        Ok(report)
    }
}
