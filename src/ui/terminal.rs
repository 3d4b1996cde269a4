use anyhow::Result;
use crossbeam::channel::Receiver;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
};
use std::{
    io,
    time::{Duration, Instant},
};

use crate::audio::{
    AudioEvent, CpalClock, FREQUENCY_RANGE, PlaybackController, SoundField, SoundKind, Sounds,
    TapTempo, Tempo,
};

/// Meters offered by the `M` key, in cycling order.
const METERS: [u32; 5] = [2, 3, 4, 6, 8];

const EDITABLE_FIELDS: [(SoundKind, SoundField); 4] = [
    (SoundKind::Normal, SoundField::Frequency),
    (SoundKind::Normal, SoundField::Volume),
    (SoundKind::Accent, SoundField::Frequency),
    (SoundKind::Accent, SoundField::Volume),
];

const FREQUENCY_STEP: f32 = 10.0;
const VOLUME_STEP: f32 = 0.05;
const REDRAW_INTERVAL: Duration = Duration::from_millis(33);
const STATUS_DURATION: Duration = Duration::from_secs(2);

/// The offered meter after `current`, wrapping back to the smallest.
fn next_meter(current: u32) -> u32 {
    METERS
        .iter()
        .copied()
        .find(|&m| m > current)
        .unwrap_or(METERS[0])
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum InputMode {
    SetBpm,
}

#[derive(Debug, Clone, PartialEq)]
enum HeaderStatus {
    InputPrompt(String, String), // (prompt, current_input)
    Message(String),
}

pub struct TerminalUI {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    controller: PlaybackController<CpalClock>,
    event_receiver: Receiver<AudioEvent>,
    is_running: bool,
    last_update: Instant,
    configured_device: Option<String>,
    input_mode: Option<InputMode>,
    input_buffer: String,
    header_status: Option<HeaderStatus>,
    status_timer: Option<Instant>,
    selected_field: usize,
    tap_tempo: TapTempo,
}

impl TerminalUI {
    pub fn new(
        controller: PlaybackController<CpalClock>,
        event_receiver: Receiver<AudioEvent>,
        configured_device: Option<String>,
    ) -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            controller,
            event_receiver,
            is_running: true,
            last_update: Instant::now(),
            configured_device,
            input_mode: None,
            input_buffer: String::new(),
            header_status: None,
            status_timer: None,
            selected_field: 0,
            tap_tempo: TapTempo::new(),
        })
    }

    /// Event loop: scheduler wake-ups, audio notifications, input and redraws
    /// all run here, one after another.
    pub fn run(&mut self) -> Result<()> {
        self.draw()?;

        while self.is_running {
            self.poll_controller();
            self.process_audio_events();
            self.check_status_timer();

            if self.last_update.elapsed() >= REDRAW_INTERVAL {
                self.draw()?;
                self.last_update = Instant::now();
            }

            if event::poll(self.poll_timeout())?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key_event(key);
            }
        }

        self.controller.teardown();
        Ok(())
    }

    /// Sleep no longer than the next scheduler wake-up or redraw.
    fn poll_timeout(&self) -> Duration {
        let now = Instant::now();
        let redraw = (self.last_update + REDRAW_INTERVAL).saturating_duration_since(now);
        match self.controller.next_wakeup() {
            Some(deadline) => redraw.min(deadline.saturating_duration_since(now)),
            None => redraw,
        }
    }

    fn poll_controller(&mut self) {
        if let Err(e) = self.controller.poll(Instant::now()) {
            self.show_status(&format!("Playback stopped: {}", e));
        }
    }

    fn process_audio_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            match event {
                AudioEvent::Error(msg) => {
                    self.show_status(&format!("Audio error: {}", msg));
                }
                AudioEvent::DeviceUpdated(Some(name)) => {
                    self.show_status(&format!("Default output is now {}", name));
                }
                AudioEvent::DeviceUpdated(None) => {
                    self.show_status("No output device");
                }
            }
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if let Some(input_mode) = self.input_mode {
            self.handle_input_key(key, input_mode);
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.is_running = false;
            }
            KeyCode::Char(' ') => match self.controller.toggle(Instant::now()) {
                Ok(()) if self.controller.is_playing() => self.show_status("Playing"),
                Ok(()) => self.show_status("Stopped"),
                Err(e) => self.show_status(&format!("Cannot start: {}", e)),
            },
            KeyCode::Char('+') | KeyCode::Char('=') => self.nudge_tempo(1),
            KeyCode::Char('-') | KeyCode::Char('_') => self.nudge_tempo(-1),
            KeyCode::PageUp => self.nudge_tempo(10),
            KeyCode::PageDown => self.nudge_tempo(-10),
            KeyCode::Char('t') | KeyCode::Char('T') => {
                self.start_input_mode(InputMode::SetBpm, "Set BPM: ");
            }
            KeyCode::Char('b') | KeyCode::Char('B') => {
                if let Some(tempo) = self.tap_tempo.tap(Instant::now()) {
                    self.controller.set_tempo(tempo);
                    self.show_status(&format!("Tap: {} BPM", tempo.bpm()));
                }
            }
            KeyCode::Char('m') | KeyCode::Char('M') => self.cycle_meter(),
            KeyCode::Char('a') | KeyCode::Char('A') => {
                let enabled = !self.controller.accent_enabled();
                self.controller.set_accent(enabled);
                if !enabled {
                    self.selected_field %= 2;
                }
                self.show_status(if enabled { "Accent ON" } else { "Accent OFF" });
            }
            KeyCode::Tab | KeyCode::Down => self.move_selection(1),
            KeyCode::BackTab | KeyCode::Up => self.move_selection(-1),
            KeyCode::Right => self.adjust_selected(1.0),
            KeyCode::Left => self.adjust_selected(-1.0),
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent, input_mode: InputMode) {
        match key.code {
            KeyCode::Enter => {
                match input_mode {
                    InputMode::SetBpm => match self.input_buffer.trim().parse::<u32>() {
                        Ok(value) => {
                            let tempo = Tempo::new(value);
                            self.controller.set_tempo(tempo);
                            self.show_status(&format!("BPM: {}", tempo.bpm()));
                        }
                        Err(_) => self.show_status("Invalid BPM"),
                    },
                }
                self.exit_input_mode();
            }
            KeyCode::Esc => {
                self.exit_input_mode();
                self.show_status("Cancelled");
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
                self.update_input_display();
            }
            KeyCode::Char(c) if c.is_ascii_digit() && self.input_buffer.len() < 3 => {
                self.input_buffer.push(c);
                self.update_input_display();
            }
            _ => {}
        }
    }

    fn nudge_tempo(&mut self, delta: i32) {
        self.controller.nudge_tempo(delta);
        self.tap_tempo.reset();
    }

    fn cycle_meter(&mut self) {
        let next = next_meter(self.controller.meter());
        match self.controller.set_meter(next, Instant::now()) {
            Ok(()) => self.show_status(&format!("{} beats per measure", next)),
            Err(e) => self.show_status(&format!("Playback stopped: {}", e)),
        }
    }

    fn selectable_fields(&self) -> usize {
        if self.controller.accent_enabled() {
            EDITABLE_FIELDS.len()
        } else {
            2
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let count = self.selectable_fields() as isize;
        self.selected_field = (self.selected_field as isize + delta).rem_euclid(count) as usize;
    }

    fn adjust_selected(&mut self, direction: f32) {
        let (kind, field) = EDITABLE_FIELDS[self.selected_field];
        let profile = *self.controller.sounds().get(kind);
        match field {
            SoundField::Frequency => self
                .controller
                .set_frequency(kind, profile.frequency + direction * FREQUENCY_STEP),
            SoundField::Volume => {
                // Snap to whole percent steps
                let gain = ((profile.gain + direction * VOLUME_STEP) * 100.0).round() / 100.0;
                self.controller.set_gain(kind, gain);
            }
        }
    }

    fn start_input_mode(&mut self, mode: InputMode, prompt: &str) {
        self.input_mode = Some(mode);
        self.input_buffer.clear();
        self.header_status = Some(HeaderStatus::InputPrompt(prompt.to_string(), String::new()));
        self.status_timer = None;
    }

    fn exit_input_mode(&mut self) {
        self.input_mode = None;
        self.input_buffer.clear();
        self.header_status = None;
    }

    fn update_input_display(&mut self) {
        if let Some(HeaderStatus::InputPrompt(prompt, _)) = &self.header_status {
            self.header_status = Some(HeaderStatus::InputPrompt(
                prompt.clone(),
                self.input_buffer.clone(),
            ));
        }
    }

    fn show_status(&mut self, message: &str) {
        self.header_status = Some(HeaderStatus::Message(message.to_string()));
        self.status_timer = Some(Instant::now());
    }

    fn check_status_timer(&mut self) {
        if let Some(timer) = self.status_timer
            && timer.elapsed() >= STATUS_DURATION
        {
            self.header_status = None;
            self.status_timer = None;
        }
    }

    fn device_label(&self) -> String {
        match self.controller.clock() {
            Some(clock) => format!(
                "{} ({}Hz, {}ch)",
                clock.device_name(),
                clock.sample_rate(),
                clock.channels()
            ),
            None => self
                .configured_device
                .clone()
                .unwrap_or_else(|| "default output".to_string()),
        }
    }

    fn draw(&mut self) -> Result<()> {
        let device_label = self.device_label();
        let header_status = self.header_status.clone();
        let playing = self.controller.is_playing();
        let tempo = self.controller.tempo();
        let meter = self.controller.meter();
        let beat = self.controller.current_beat();
        let accent = self.controller.accent_enabled();
        let sounds = *self.controller.sounds();
        let selected = EDITABLE_FIELDS[self.selected_field];

        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3), // Header
                    Constraint::Length(3), // Tempo
                    Constraint::Length(3), // Beats
                    Constraint::Min(6),    // Sounds
                    Constraint::Length(4), // Footer
                ])
                .split(f.area());

            Self::draw_header_static(f, chunks[0], &device_label, playing, &header_status);
            Self::draw_tempo_static(f, chunks[1], tempo, meter);
            Self::draw_beats_static(f, chunks[2], meter, beat, accent, playing);
            Self::draw_sounds_static(f, chunks[3], &sounds, accent, selected);
            Self::draw_footer_static(f, chunks[4], playing, accent);
        })?;
        Ok(())
    }

    fn draw_header_static(
        f: &mut Frame,
        area: Rect,
        device_label: &str,
        playing: bool,
        header_status: &Option<HeaderStatus>,
    ) {
        let state = if playing {
            Span::styled(
                " ▶ PLAYING ",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled(" ■ STOPPED ", Style::default().fg(Color::Red))
        };

        let mut spans = vec![
            state,
            Span::styled("| ", Style::default().fg(Color::DarkGray)),
            Span::raw(format!("Output: {} ", device_label)),
        ];
        match header_status {
            Some(HeaderStatus::InputPrompt(prompt, input)) => {
                spans.push(Span::styled("| ", Style::default().fg(Color::DarkGray)));
                spans.push(Span::styled(
                    format!("{}{}_", prompt, input),
                    Style::default().fg(Color::Yellow),
                ));
            }
            Some(HeaderStatus::Message(message)) => {
                spans.push(Span::styled("| ", Style::default().fg(Color::DarkGray)));
                spans.push(Span::styled(
                    message.clone(),
                    Style::default().fg(Color::Cyan),
                ));
            }
            None => {}
        }

        let header = Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::ALL).title("Clicktrack"));
        f.render_widget(header, area);
    }

    fn draw_tempo_static(f: &mut Frame, area: Rect, tempo: Tempo, meter: u32) {
        let span = (Tempo::MAX - Tempo::MIN) as f64;
        let ratio = (tempo.bpm() - Tempo::MIN) as f64 / span;
        let gauge = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Tempo ({}/4)", meter)),
            )
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(ratio.clamp(0.0, 1.0))
            .label(format!("{} BPM", tempo.bpm()));
        f.render_widget(gauge, area);
    }

    fn draw_beats_static(
        f: &mut Frame,
        area: Rect,
        meter: u32,
        current: usize,
        accent: bool,
        playing: bool,
    ) {
        let mut spans = Vec::with_capacity(meter as usize * 2);
        for i in 0..meter as usize {
            let style = if i == current {
                let color = if playing { Color::Blue } else { Color::Gray };
                Style::default().fg(color).add_modifier(Modifier::BOLD)
            } else if accent && i == 0 {
                Style::default().fg(Color::Magenta)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let symbol = if i == current { "●" } else { "○" };
            spans.push(Span::styled(symbol, style));
            spans.push(Span::raw("  "));
        }

        let beats = Paragraph::new(Line::from(spans))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Beat"));
        f.render_widget(beats, area);
    }

    fn draw_sounds_static(
        f: &mut Frame,
        area: Rect,
        sounds: &Sounds,
        accent: bool,
        selected: (SoundKind, SoundField),
    ) {
        let columns = if accent {
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area)
        } else {
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(100)])
                .split(area)
        };

        Self::draw_sound_panel_static(
            f,
            columns[0],
            "Normal Beat Sound",
            SoundKind::Normal,
            sounds,
            selected,
        );
        // The accent sound only matters when accenting is on
        if accent {
            Self::draw_sound_panel_static(
                f,
                columns[1],
                "Accent Beat Sound",
                SoundKind::Accent,
                sounds,
                selected,
            );
        }
    }

    fn draw_sound_panel_static(
        f: &mut Frame,
        area: Rect,
        title: &str,
        kind: SoundKind,
        sounds: &Sounds,
        selected: (SoundKind, SoundField),
    ) {
        let profile = sounds.get(kind);
        let block = Block::default().borders(Borders::ALL).title(title.to_string());
        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Length(3)])
            .split(inner);

        let highlight = |field: SoundField| {
            if selected == (kind, field) {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            }
        };

        let (low, high) = FREQUENCY_RANGE;
        let frequency = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(highlight(SoundField::Frequency))
                    .title("Frequency"),
            )
            .gauge_style(Style::default().fg(Color::Green))
            .ratio((((profile.frequency - low) / (high - low)) as f64).clamp(0.0, 1.0))
            .label(format!("{:.0} Hz", profile.frequency));
        f.render_widget(frequency, rows[0]);

        let volume = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(highlight(SoundField::Volume))
                    .title("Volume"),
            )
            .gauge_style(Style::default().fg(Color::Green))
            .ratio((profile.gain as f64).clamp(0.0, 1.0))
            .label(format!("{:.0}%", profile.gain * 100.0));
        f.render_widget(volume, rows[1]);
    }

    fn draw_footer_static(f: &mut Frame, area: Rect, playing: bool, accent: bool) {
        // Define colors for syntax highlighting
        let key_color = Color::Yellow;
        let desc_color = Color::White;
        let sep_color = Color::DarkGray;

        let key_desc = |key: &str, desc: &str| -> Vec<Span> {
            vec![
                Span::styled(
                    key.to_string(),
                    Style::default().fg(key_color).add_modifier(Modifier::BOLD),
                ),
                Span::styled("=".to_string(), Style::default().fg(sep_color)),
                Span::styled(desc.to_string(), Style::default().fg(desc_color)),
            ]
        };
        let separator = || Span::styled(" | ".to_string(), Style::default().fg(sep_color));

        let mut line1_spans = Vec::new();
        line1_spans.extend(key_desc("Space", if playing { "Stop" } else { "Start" }));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("+/-", "BPM ±1"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("PgUp/PgDn", "BPM ±10"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("T", "Set BPM"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("B", "Tap"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("Q", "Quit"));

        let mut line2_spans = Vec::new();
        line2_spans.extend(key_desc("M", "Meter"));
        line2_spans.push(separator());
        line2_spans.extend(key_desc("A", if accent { "Accent On" } else { "Accent Off" }));
        line2_spans.push(separator());
        line2_spans.extend(key_desc("↑↓/Tab", "Select"));
        line2_spans.push(separator());
        line2_spans.extend(key_desc("←→", "Adjust"));

        let footer = Paragraph::new(vec![Line::from(line1_spans), Line::from(line2_spans)])
            .block(Block::default().borders(Borders::ALL).title("Controls"));
        f.render_widget(footer, area);
    }
}

impl Drop for TerminalUI {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
    }
}
