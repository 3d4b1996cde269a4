use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetronomeError {
    #[error("no output device available")]
    NoOutputDevice,
    #[error("output device '{0}' not found")]
    DeviceNotFound(String),
    #[error(transparent)]
    Devices(#[from] cpal::DevicesError),
    #[error(transparent)]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error(transparent)]
    PauseStream(#[from] cpal::PauseStreamError),
    #[error("audio clock has been released")]
    ClockReleased,
    #[error("tone queue is full")]
    ToneQueueFull,
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, MetronomeError>;
