use super::tone::ScheduledTone;
use crate::error::{MetronomeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Running,
    Suspended,
    Closed,
}

/// A monotonic audio timeline that can play tones at exact future times.
pub trait AudioClock {
    /// Seconds since the clock was created. Never decreases.
    fn current_time(&self) -> f64;

    fn state(&self) -> ClockState;

    fn resume(&mut self) -> Result<()>;

    fn suspend(&mut self) -> Result<()>;

    /// Release the underlying resources. Closing twice is a no-op.
    fn close(&mut self);

    fn schedule_tone(&mut self, tone: ScheduledTone) -> Result<()>;
}

/// Clock advanced by hand. Records every tone instead of playing it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: f64,
    state: ClockState,
    scheduled: Vec<ScheduledTone>,
    capacity: Option<usize>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            state: ClockState::Running,
            scheduled: Vec::new(),
            capacity: None,
        }
    }

    /// Holds at most `capacity` undrained tones, like a fixed tone queue.
    /// [`Self::take_scheduled`] frees the space again.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    pub fn suspended() -> Self {
        Self {
            state: ClockState::Suspended,
            ..Self::new()
        }
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = self.time.max(time);
    }

    pub fn advance(&mut self, seconds: f64) {
        self.set_time(self.time + seconds);
    }

    pub fn scheduled(&self) -> &[ScheduledTone] {
        &self.scheduled
    }

    pub fn take_scheduled(&mut self) -> Vec<ScheduledTone> {
        std::mem::take(&mut self.scheduled)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn state(&self) -> ClockState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        match self.state {
            ClockState::Closed => Err(MetronomeError::ClockReleased),
            _ => {
                self.state = ClockState::Running;
                Ok(())
            }
        }
    }

    fn suspend(&mut self) -> Result<()> {
        match self.state {
            ClockState::Closed => Err(MetronomeError::ClockReleased),
            _ => {
                self.state = ClockState::Suspended;
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        self.state = ClockState::Closed;
    }

    fn schedule_tone(&mut self, tone: ScheduledTone) -> Result<()> {
        if self.state == ClockState::Closed {
            return Err(MetronomeError::ClockReleased);
        }
        if self
            .capacity
            .is_some_and(|capacity| self.scheduled.len() >= capacity)
        {
            return Err(MetronomeError::ToneQueueFull);
        }
        self.scheduled.push(tone);
        Ok(())
    }
}
