use std::f32::consts::TAU;

use super::clock::AudioClock;
use super::Sounds;
use crate::error::Result;

/// Amplitude the click envelope decays toward by the end of the tone.
pub const ENVELOPE_FLOOR: f32 = 0.001;

/// A click placed on the audio clock timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTone {
    /// Clock time in seconds of the first audible sample.
    pub start: f64,
    pub frequency: f32,
    pub duration: f64,
    pub gain: f32,
    pub beat: usize,
    pub accented: bool,
}

/// Pick the profile for `beat` and schedule its tone to start exactly at `at`.
pub fn emit<C: AudioClock + ?Sized>(
    clock: &mut C,
    beat: usize,
    sounds: &Sounds,
    accent_enabled: bool,
    at: f64,
) -> Result<ScheduledTone> {
    let (profile, accented) = sounds.select(beat, accent_enabled);
    let tone = ScheduledTone {
        start: at,
        frequency: profile.frequency,
        duration: profile.duration,
        gain: profile.gain,
        beat,
        accented,
    };
    clock.schedule_tone(tone)?;
    Ok(tone)
}

/// Sample-level renderer for one scheduled tone: a sine oscillator whose
/// amplitude falls exponentially from `gain` to [`ENVELOPE_FLOOR`].
#[derive(Debug, Clone)]
pub struct ToneVoice {
    start_frame: u64,
    length: u64,
    rendered: u64,
    phase: f32,
    phase_increment: f32,
    amplitude: f32,
    decay: f32,
}

impl ToneVoice {
    pub fn new(tone: &ScheduledTone, sample_rate: u32) -> Self {
        let rate = sample_rate as f64;
        let start_frame = (tone.start.max(0.0) * rate).round() as u64;
        let length = (tone.duration * rate).round().max(1.0) as u64;

        // A ramp cannot start at or below its own target
        let (amplitude, decay) = if tone.gain > ENVELOPE_FLOOR {
            let decay = (ENVELOPE_FLOOR / tone.gain).powf(1.0 / length as f32);
            (tone.gain, decay)
        } else {
            (0.0, 1.0)
        };

        Self {
            start_frame,
            length,
            rendered: 0,
            phase: 0.0,
            phase_increment: TAU * tone.frequency / sample_rate as f32,
            amplitude,
            decay,
        }
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn is_finished(&self) -> bool {
        self.rendered >= self.length
    }

    /// Mix this voice into an interleaved buffer whose first frame is
    /// `first_frame` on the clock. Returns false once the voice has ended.
    pub fn render_into(&mut self, output: &mut [f32], channels: usize, first_frame: u64) -> bool {
        let channels = channels.max(1);
        for (offset, frame) in output.chunks_mut(channels).enumerate() {
            if self.is_finished() {
                break;
            }
            if first_frame + (offset as u64) < self.start_frame {
                continue;
            }

            let sample = self.next_sample();
            for slot in frame.iter_mut() {
                *slot += sample;
            }
        }
        !self.is_finished()
    }

    fn next_sample(&mut self) -> f32 {
        let sample = self.phase.sin() * self.amplitude;
        self.phase = (self.phase + self.phase_increment) % TAU;
        self.amplitude *= self.decay;
        self.rendered += 1;
        sample
    }
}
