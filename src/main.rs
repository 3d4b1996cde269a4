use anyhow::{Context, Result, anyhow};
use clicktrack::audio::stream::enumerate_output_devices;
use clicktrack::audio::{AudioEvent, CpalClock, PlaybackController};
use clicktrack::{Config, TerminalUI};
use crossbeam::channel;
use log::info;
use std::fs::OpenOptions;
use std::path::PathBuf;

fn print_help() {
    println!("Clicktrack - Terminal metronome with sample-accurate clicks");
    println!();
    println!("USAGE:");
    println!("    clicktrack [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help            Print this help message");
    println!("    --config <PATH>       Read settings from a TOML file");
    println!("    --list-devices        List output devices and exit");
    println!("    --debug               Write debug logging to debug.log");
    println!();
    println!("CONTROLS:");
    println!("    Space      Start/stop");
    println!("    +/-        Tempo ±1 BPM");
    println!("    PgUp/PgDn  Tempo ±10 BPM");
    println!("    T          Type a tempo");
    println!("    B          Tap tempo");
    println!("    M          Cycle beats per measure (2, 3, 4, 6, 8)");
    println!("    A          Toggle accent on the first beat");
    println!("    ↑↓/Tab     Select sound setting");
    println!("    ←→         Adjust sound setting");
    println!("    Q          Quit");
    println!();
    println!("EXAMPLES:");
    println!("    clicktrack                          # 120 BPM in 4 with defaults");
    println!("    clicktrack --config practice.toml   # Start from saved settings");
}

/// Debug mode sends everything to debug.log so the terminal UI stays intact.
/// Otherwise logging is off unless RUST_LOG asks for it.
fn init_logging(debug_mode: bool) -> Result<()> {
    let default_filter = if debug_mode { "debug" } else { "off" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));

    if debug_mode {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open("debug.log")
            .context("failed to open debug.log")?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

fn config_path(args: &[String]) -> Result<Option<PathBuf>> {
    match args.iter().position(|arg| arg == "--config") {
        Some(i) => args
            .get(i + 1)
            .map(|path| Some(PathBuf::from(path)))
            .ok_or_else(|| anyhow!("--config needs a file path")),
        None => Ok(None),
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_help();
        return Ok(());
    }

    let debug_mode = args.contains(&"--debug".to_string());
    init_logging(debug_mode)?;

    if args.contains(&"--list-devices".to_string()) {
        println!("Available output devices:");
        for (i, name) in enumerate_output_devices()?.iter().enumerate() {
            println!("  {}: {}", i, name);
        }
        return Ok(());
    }

    let config = match config_path(&args)? {
        Some(path) => Config::load(&path)
            .with_context(|| format!("could not load settings from {}", path.display()))?,
        None => Config::default(),
    };
    info!(
        "starting at {} BPM, {} beats per measure, accent {}",
        config.tempo, config.meter, config.accent_first_beat
    );

    // Stream errors flow from the audio thread back to the UI
    let (event_sender, event_receiver) = channel::unbounded::<AudioEvent>();

    let audio_config = config.audio.clone();
    let controller = PlaybackController::new(config.build_scheduler(), move || {
        CpalClock::open(&audio_config, event_sender.clone())
    });

    let mut ui = TerminalUI::new(controller, event_receiver, config.audio.output_device.clone())
        .context("UI creation failed")?;
    ui.run().context("UI run failed")?;
    drop(ui);

    println!("Clicktrack stopped.");
    Ok(())
}
