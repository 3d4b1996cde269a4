use std::fs::read_to_string;
use std::path::Path;

use serde::Deserialize;

use crate::audio::{AudioConfig, BeatScheduler, SchedulerConfig, Sounds, Tempo};
use crate::error::{MetronomeError, Result};

/// Startup settings. Read once; never written back.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tempo: u32,
    pub meter: u32,
    pub accent_first_beat: bool,
    pub sounds: Sounds,
    pub scheduler: SchedulerConfig,
    pub audio: AudioConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tempo: Tempo::default().bpm(),
            meter: 4,
            accent_first_beat: true,
            sounds: Sounds::default(),
            scheduler: SchedulerConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_to_string(path).map_err(|source| MetronomeError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate. Tempo is clamped rather than rejected.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(text)?;
        config.tempo = Tempo::new(config.tempo).bpm();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MetronomeError::InvalidConfig(msg));

        if self.meter == 0 {
            return invalid("meter must be at least 1".to_string());
        }
        if let Err(msg) = self.sounds.normal.validate() {
            return invalid(format!("sounds.normal: {}", msg));
        }
        if let Err(msg) = self.sounds.accent.validate() {
            return invalid(format!("sounds.accent: {}", msg));
        }
        if self.scheduler.lookahead_ms == 0 {
            return invalid("scheduler.lookahead_ms must be positive".to_string());
        }
        if self.scheduler.poll_interval_ms == 0 {
            return invalid("scheduler.poll_interval_ms must be positive".to_string());
        }
        if self.audio.tone_queue_capacity == 0 {
            return invalid("audio.tone_queue_capacity must be positive".to_string());
        }
        let cap = self.scheduler.max_catch_up_beats as usize;
        if cap == 0 || cap > self.audio.tone_queue_capacity {
            return invalid(format!(
                "scheduler.max_catch_up_beats must be within 1..={} (audio.tone_queue_capacity), got {}",
                self.audio.tone_queue_capacity, cap
            ));
        }
        Ok(())
    }

    pub fn build_scheduler(&self) -> BeatScheduler {
        BeatScheduler::new(
            Tempo::new(self.tempo),
            self.meter,
            self.accent_first_beat,
            self.sounds,
            self.scheduler,
        )
    }
}
