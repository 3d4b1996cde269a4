use std::time::Instant;

use log::{debug, error, info};

use super::clock::{AudioClock, ClockState};
use super::scheduler::{BeatScheduler, TickReport};
use super::tempo::Tempo;
use super::timer::{TimerHandle, WakeupTimer};
use super::{FREQUENCY_RANGE, SoundKind, Sounds};
use crate::error::{MetronomeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

type ClockOpener<C> = Box<dyn FnMut() -> Result<C>>;

/// Start/stop lifecycle around the beat scheduler.
///
/// Owns the audio clock (opened lazily on first start), the scheduler state
/// and the single pending wake-up. Everything runs on the caller's event
/// loop: [`PlaybackController::poll`] must be called regularly and fires the
/// scheduler whenever the wake-up is due.
pub struct PlaybackController<C: AudioClock> {
    scheduler: BeatScheduler,
    clock: Option<C>,
    open_clock: ClockOpener<C>,
    timer: WakeupTimer,
    wakeup: Option<TimerHandle>,
    state: PlaybackState,
}

impl<C: AudioClock> PlaybackController<C> {
    pub fn new<F>(scheduler: BeatScheduler, open_clock: F) -> Self
    where
        F: FnMut() -> Result<C> + 'static,
    {
        Self {
            scheduler,
            clock: None,
            open_clock: Box::new(open_clock),
            timer: WakeupTimer::new(),
            wakeup: None,
            state: PlaybackState::Stopped,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn current_beat(&self) -> usize {
        self.scheduler.current_beat()
    }

    pub fn meter(&self) -> u32 {
        self.scheduler.meter()
    }

    pub fn tempo(&self) -> Tempo {
        self.scheduler.tempo
    }

    pub fn accent_enabled(&self) -> bool {
        self.scheduler.accent_enabled
    }

    pub fn sounds(&self) -> &Sounds {
        &self.scheduler.sounds
    }

    pub fn clock(&self) -> Option<&C> {
        self.clock.as_ref()
    }

    /// When the event loop should next call [`Self::poll`].
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn toggle(&mut self, wall_now: Instant) -> Result<()> {
        if self.is_playing() {
            self.stop();
            Ok(())
        } else {
            self.start(wall_now)
        }
    }

    /// Open or resume the clock and start the beat loop on a downbeat.
    /// On failure playback stays stopped and nothing is armed.
    pub fn start(&mut self, wall_now: Instant) -> Result<()> {
        if self.is_playing() {
            return Ok(());
        }

        self.ensure_clock()?;
        let report = self.restart_timeline(wall_now)?;
        self.state = PlaybackState::Playing;
        info!(
            "playback started at {} BPM in {}, {} beat(s) queued",
            self.scheduler.tempo.bpm(),
            self.scheduler.meter(),
            report.emitted
        );
        Ok(())
    }

    /// Stop the beat loop. Stopping twice is harmless.
    pub fn stop(&mut self) {
        self.cancel_wakeup();
        if self.state == PlaybackState::Playing {
            info!("playback stopped");
        }
        self.state = PlaybackState::Stopped;
    }

    /// Run the scheduler if its wake-up is due, then re-arm it.
    pub fn poll(&mut self, wall_now: Instant) -> Result<Option<TickReport>> {
        let Some(handle) = self.timer.take_due(wall_now) else {
            return Ok(None);
        };
        if self.wakeup != Some(handle) || !self.is_playing() {
            return Ok(None);
        }
        self.wakeup = None;

        match self.run_tick() {
            Ok(report) => {
                self.arm(wall_now);
                Ok(Some(report))
            }
            Err(e) => {
                error!("scheduler pass failed, stopping: {}", e);
                self.stop();
                Err(e)
            }
        }
    }

    /// Change beats per measure. While playing the bar restarts at the
    /// current clock time so the next beat is a downbeat.
    pub fn set_meter(&mut self, meter: u32, wall_now: Instant) -> Result<()> {
        if meter == self.scheduler.meter() {
            return Ok(());
        }
        self.scheduler.set_meter(meter);
        info!("meter changed to {}", meter);

        if self.is_playing() {
            if let Err(e) = self.restart_timeline(wall_now) {
                error!("could not restart bar after meter change: {}", e);
                self.stop();
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        if tempo != self.scheduler.tempo {
            debug!("tempo {} -> {} BPM", self.scheduler.tempo.bpm(), tempo.bpm());
        }
        self.scheduler.tempo = tempo;
    }

    pub fn nudge_tempo(&mut self, delta: i32) {
        self.set_tempo(self.scheduler.tempo.nudge(delta));
    }

    pub fn set_accent(&mut self, enabled: bool) {
        self.scheduler.accent_enabled = enabled;
    }

    pub fn set_frequency(&mut self, kind: SoundKind, frequency: f32) {
        self.scheduler.sounds.get_mut(kind).frequency =
            frequency.clamp(FREQUENCY_RANGE.0, FREQUENCY_RANGE.1);
    }

    pub fn set_gain(&mut self, kind: SoundKind, gain: f32) {
        self.scheduler.sounds.get_mut(kind).gain = gain.clamp(0.0, 1.0);
    }

    /// Cancel any wake-up and release the audio clock.
    pub fn teardown(&mut self) {
        self.stop();
        if let Some(mut clock) = self.clock.take() {
            clock.close();
            debug!("audio clock released");
        }
    }

    fn ensure_clock(&mut self) -> Result<()> {
        if self
            .clock
            .as_ref()
            .is_some_and(|clock| clock.state() == ClockState::Closed)
        {
            self.clock = None;
        }

        if self.clock.is_none() {
            let clock = (self.open_clock)().inspect_err(|e| {
                error!("audio clock unavailable: {}", e);
            })?;
            self.clock = Some(clock);
        }

        if let Some(clock) = self.clock.as_mut()
            && clock.state() == ClockState::Suspended
        {
            clock.resume()?;
        }
        Ok(())
    }

    /// Park the beat counter before the downbeat, move the cursor to the
    /// clock's present and run one scheduler pass.
    fn restart_timeline(&mut self, wall_now: Instant) -> Result<TickReport> {
        self.cancel_wakeup();
        let clock = self.clock.as_mut().ok_or(MetronomeError::ClockReleased)?;
        self.scheduler.reset(clock.current_time());
        let report = self.run_tick()?;
        self.arm(wall_now);
        Ok(report)
    }

    fn run_tick(&mut self) -> Result<TickReport> {
        let clock = self.clock.as_mut().ok_or(MetronomeError::ClockReleased)?;
        let now = clock.current_time();
        self.scheduler.tick(now, clock)
    }

    fn arm(&mut self, wall_now: Instant) {
        let delay = self.scheduler.config().poll_interval();
        self.wakeup = Some(self.timer.arm(wall_now, delay));
    }

    fn cancel_wakeup(&mut self) {
        self.timer.cancel(self.wakeup.take());
    }
}

impl<C: AudioClock> Drop for PlaybackController<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use crate::audio::scheduler::SchedulerConfig;
    use crate::audio::tone::ScheduledTone;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    const POLL: Duration = Duration::from_millis(25);

    fn controller(bpm: u32, meter: u32) -> PlaybackController<ManualClock> {
        let scheduler = BeatScheduler::new(
            Tempo::new(bpm),
            meter,
            true,
            Sounds::default(),
            SchedulerConfig::default(),
        );
        PlaybackController::new(scheduler, || Ok(ManualClock::new()))
    }

    fn clock(controller: &mut PlaybackController<ManualClock>) -> &mut ManualClock {
        controller.clock.as_mut().unwrap()
    }

    /// Advance audio and wall time together by one polling interval.
    fn step(controller: &mut PlaybackController<ManualClock>, wall: &mut Instant) {
        *wall += POLL;
        clock(controller).advance(POLL.as_secs_f64());
        controller.poll(*wall).unwrap();
    }

    fn scheduled(controller: &PlaybackController<ManualClock>) -> Vec<ScheduledTone> {
        controller.clock().unwrap().scheduled().to_vec()
    }

    #[test]
    fn test_start_primes_downbeat_and_arms() {
        let mut controller = controller(120, 4);
        let wall = Instant::now();

        controller.start(wall).unwrap();

        assert!(controller.is_playing());
        assert_eq!(controller.current_beat(), 0);
        assert_eq!(controller.next_wakeup(), Some(wall + POLL));
        let tones = scheduled(&controller);
        assert_eq!(tones.len(), 1);
        assert_eq!(tones[0].beat, 0);
        assert!(tones[0].accented);
    }

    #[test]
    fn test_start_uses_current_clock_time() {
        let mut controller = controller(120, 4);
        let mut wall = Instant::now();
        controller.start(wall).unwrap();
        controller.stop();

        clock(&mut controller).set_time(7.3);
        clock(&mut controller).take_scheduled();
        wall += Duration::from_secs(7);
        controller.start(wall).unwrap();

        let tones = scheduled(&controller);
        assert_eq!(tones[0].beat, 0);
        assert_eq!(tones[0].start, 7.3);
    }

    #[test]
    fn test_metronome_at_120_in_four() {
        let mut controller = controller(120, 4);
        let mut wall = Instant::now();
        controller.start(wall).unwrap();

        for _ in 0..160 {
            step(&mut controller, &mut wall);
            assert!(controller.current_beat() < 4);
        }

        let tones = scheduled(&controller);
        assert!(tones.len() >= 8);
        for (i, tone) in tones.iter().enumerate() {
            assert_eq!(tone.beat, i % 4);
            assert!((tone.start - i as f64 * 0.5).abs() < 1e-9);
            let expected = if i % 4 == 0 { 1600.0 } else { 800.0 };
            assert_eq!(tone.frequency, expected);
        }
    }

    #[test]
    fn test_stop_cancels_wakeup_and_is_idempotent() {
        let mut controller = controller(120, 4);
        let mut wall = Instant::now();
        controller.start(wall).unwrap();

        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(controller.next_wakeup(), None);

        // No further passes once stopped
        let before = scheduled(&controller).len();
        for _ in 0..100 {
            step(&mut controller, &mut wall);
        }
        assert_eq!(scheduled(&controller).len(), before);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let mut controller = controller(120, 4);
        controller.stop();
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert!(controller.clock().is_none());
    }

    #[test]
    fn test_start_twice_keeps_single_loop() {
        let mut controller = controller(120, 4);
        let wall = Instant::now();
        controller.start(wall).unwrap();
        controller.start(wall + Duration::from_millis(5)).unwrap();

        assert_eq!(scheduled(&controller).len(), 1);
        assert_eq!(controller.next_wakeup(), Some(wall + POLL));
    }

    #[test]
    fn test_meter_change_restarts_bar() {
        let mut controller = controller(120, 4);
        let mut wall = Instant::now();
        controller.start(wall).unwrap();

        // 0.6s in: beats at 0.0 and 0.5 have been committed, 1.0 is pending
        for _ in 0..24 {
            step(&mut controller, &mut wall);
        }
        let before = scheduled(&controller);
        assert_eq!(before.iter().map(|t| t.beat).collect::<Vec<_>>(), vec![0, 1]);

        controller.set_meter(3, wall).unwrap();
        assert_eq!(controller.next_wakeup(), Some(wall + POLL));

        for _ in 0..100 {
            step(&mut controller, &mut wall);
        }

        let after = &scheduled(&controller)[before.len()..];
        let now = 0.6;
        assert!((after[0].start - now).abs() < 1e-6);
        let beats: Vec<usize> = after.iter().map(|t| t.beat).collect();
        assert_eq!(&beats[..6], &[0, 1, 2, 0, 1, 2]);
        // The old bar's third beat at 1.0s is never played
        assert!(after.iter().all(|t| (t.start - 1.0).abs() > 1e-6));
    }

    #[test]
    fn test_meter_change_while_stopped() {
        let mut controller = controller(120, 4);
        controller.set_meter(6, Instant::now()).unwrap();

        assert_eq!(controller.meter(), 6);
        assert_eq!(controller.current_beat(), 5);
        assert!(controller.clock().is_none());
        assert_eq!(controller.next_wakeup(), None);
    }

    #[test]
    fn test_tempo_change_while_playing() {
        let mut controller = controller(120, 4);
        let mut wall = Instant::now();
        controller.start(wall).unwrap();
        for _ in 0..20 {
            step(&mut controller, &mut wall);
        }

        controller.set_tempo(Tempo::new(60));
        for _ in 0..120 {
            step(&mut controller, &mut wall);
        }

        // 1.0 was already placed by the 0.5s spacing; the new tempo spaces
        // everything after it
        let starts: Vec<f64> = scheduled(&controller).iter().map(|t| t.start).collect();
        assert_eq!(&starts[..4], &[0.0, 0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_failed_clock_leaves_stopped() {
        let scheduler = BeatScheduler::new(
            Tempo::default(),
            4,
            true,
            Sounds::default(),
            SchedulerConfig::default(),
        );
        let mut controller: PlaybackController<ManualClock> =
            PlaybackController::new(scheduler, || Err(MetronomeError::NoOutputDevice));

        let result = controller.start(Instant::now());

        assert!(matches!(result, Err(MetronomeError::NoOutputDevice)));
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(controller.next_wakeup(), None);
        assert!(controller.clock().is_none());
    }

    #[test]
    fn test_clock_opened_once_and_resumed() {
        let opened = Rc::new(Cell::new(0));
        let counter = Rc::clone(&opened);
        let scheduler = BeatScheduler::new(
            Tempo::default(),
            4,
            true,
            Sounds::default(),
            SchedulerConfig::default(),
        );
        let mut controller = PlaybackController::new(scheduler, move || {
            counter.set(counter.get() + 1);
            Ok(ManualClock::suspended())
        });
        let wall = Instant::now();

        controller.start(wall).unwrap();
        assert_eq!(controller.clock().unwrap().state(), ClockState::Running);

        controller.stop();
        clock(&mut controller).suspend().unwrap();
        controller.start(wall).unwrap();

        assert_eq!(opened.get(), 1);
        assert_eq!(controller.clock().unwrap().state(), ClockState::Running);
    }

    #[test]
    fn test_teardown_releases_clock() {
        let mut controller = controller(120, 4);
        let wall = Instant::now();
        controller.start(wall).unwrap();

        controller.teardown();
        controller.teardown();

        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert!(controller.clock().is_none());
        assert_eq!(controller.next_wakeup(), None);
        assert_eq!(controller.poll(wall + POLL).unwrap(), None);
    }

    #[test]
    fn test_closed_clock_stops_playback() {
        let mut controller = controller(120, 4);
        let wall = Instant::now();
        controller.start(wall).unwrap();

        clock(&mut controller).close();
        clock(&mut controller).advance(1.0);
        let result = controller.poll(wall + POLL);

        assert!(matches!(result, Err(MetronomeError::ClockReleased)));
        assert!(!controller.is_playing());
        assert_eq!(controller.next_wakeup(), None);
    }

    #[test]
    fn test_sound_setters_clamp() {
        let mut controller = controller(120, 4);
        controller.set_frequency(SoundKind::Normal, 50.0);
        controller.set_gain(SoundKind::Accent, 1.7);

        assert_eq!(controller.sounds().normal.frequency, 200.0);
        assert_eq!(controller.sounds().accent.gain, 1.0);
    }
}
