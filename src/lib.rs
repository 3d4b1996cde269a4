pub mod audio;
pub mod config;
pub mod error;
pub mod ui;

pub use audio::{PlaybackController, PlaybackState};
pub use config::Config;
pub use error::{MetronomeError, Result};
pub use ui::TerminalUI;
