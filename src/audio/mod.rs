pub mod clock;
pub mod controller;
pub mod scheduler;
pub mod stream;
pub mod tempo;
pub mod timer;
pub mod tone;

pub use clock::{AudioClock, ClockState, ManualClock};
pub use controller::{PlaybackController, PlaybackState};
pub use scheduler::{BeatScheduler, SchedulerConfig, TickReport};
pub use stream::CpalClock;
pub use tempo::{TapTempo, Tempo};
pub use timer::{TimerHandle, WakeupTimer};
pub use tone::{ScheduledTone, ToneVoice};

use serde::Deserialize;

/// Frequency range offered by the sound editor.
pub const FREQUENCY_RANGE: (f32, f32) = (200.0, 2000.0);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name; the host default is used when unset.
    pub output_device: Option<String>,
    pub buffer_size: Option<u32>,
    pub tone_queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_device: None,
            buffer_size: None,
            tone_queue_capacity: 256,
        }
    }
}

/// Synthesis parameters for one click sound.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SoundProfile {
    pub frequency: f32,
    pub duration: f64,
    pub gain: f32,
}

impl SoundProfile {
    pub const NORMAL: Self = Self {
        frequency: 800.0,
        duration: 0.05,
        gain: 0.5,
    };

    pub const ACCENT: Self = Self {
        frequency: 1600.0,
        duration: 0.05,
        gain: 0.8,
    };

    pub fn validate(&self) -> Result<(), String> {
        if !(self.frequency > 0.0) {
            return Err(format!("frequency must be positive, got {}", self.frequency));
        }
        if !(self.duration > 0.0) {
            return Err(format!("duration must be positive, got {}", self.duration));
        }
        if !(0.0..=1.0).contains(&self.gain) {
            return Err(format!("gain must be within 0.0..=1.0, got {}", self.gain));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Sounds {
    pub normal: SoundProfile,
    pub accent: SoundProfile,
}

impl Default for Sounds {
    fn default() -> Self {
        Self {
            normal: SoundProfile::NORMAL,
            accent: SoundProfile::ACCENT,
        }
    }
}

impl Sounds {
    /// Accent applies to the downbeat only, and only when accenting is enabled.
    pub fn select(&self, beat: usize, accent_enabled: bool) -> (&SoundProfile, bool) {
        if accent_enabled && beat == 0 {
            (&self.accent, true)
        } else {
            (&self.normal, false)
        }
    }

    pub fn get(&self, kind: SoundKind) -> &SoundProfile {
        match kind {
            SoundKind::Normal => &self.normal,
            SoundKind::Accent => &self.accent,
        }
    }

    pub fn get_mut(&mut self, kind: SoundKind) -> &mut SoundProfile {
        match kind {
            SoundKind::Normal => &mut self.normal,
            SoundKind::Accent => &mut self.accent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    Normal,
    Accent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundField {
    Frequency,
    Volume,
}

/// Notifications raised from the audio backend thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    Error(String),
    DeviceUpdated(Option<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles() {
        let sounds = Sounds::default();
        assert_eq!(sounds.normal.frequency, 800.0);
        assert_eq!(sounds.normal.gain, 0.5);
        assert_eq!(sounds.accent.frequency, 1600.0);
        assert_eq!(sounds.accent.gain, 0.8);
    }

    #[test]
    fn test_accent_selection() {
        let sounds = Sounds::default();

        let (profile, accented) = sounds.select(0, true);
        assert!(accented);
        assert_eq!(profile.frequency, 1600.0);

        let (profile, accented) = sounds.select(1, true);
        assert!(!accented);
        assert_eq!(profile.frequency, 800.0);

        // Without accenting the downbeat is an ordinary click
        let (profile, accented) = sounds.select(0, false);
        assert!(!accented);
        assert_eq!(profile.frequency, 800.0);
    }

    #[test]
    fn test_profile_validation() {
        assert!(SoundProfile::NORMAL.validate().is_ok());

        let silent = SoundProfile {
            gain: 0.0,
            ..SoundProfile::NORMAL
        };
        assert!(silent.validate().is_ok());

        let loud = SoundProfile {
            gain: 1.5,
            ..SoundProfile::NORMAL
        };
        assert!(loud.validate().is_err());

        let zero_length = SoundProfile {
            duration: 0.0,
            ..SoundProfile::NORMAL
        };
        assert!(zero_length.validate().is_err());

        let nan_pitch = SoundProfile {
            frequency: f32::NAN,
            ..SoundProfile::NORMAL
        };
        assert!(nan_pitch.validate().is_err());
    }
}
