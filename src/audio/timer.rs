use std::time::{Duration, Instant};

/// Identifies one armed wake-up. A handle stays valid until it fires or is
/// cancelled; stale handles are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Single-slot cooperative timer polled from the event loop.
///
/// At most one wake-up is pending at any time, so two scheduler passes can
/// never overlap.
#[derive(Debug, Default)]
pub struct WakeupTimer {
    next_id: u64,
    pending: Option<(TimerHandle, Instant)>,
}

impl WakeupTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a wake-up `delay` after `now`, replacing any pending one.
    pub fn arm(&mut self, now: Instant, delay: Duration) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.pending = Some((handle, now + delay));
        handle
    }

    /// Cancel `handle` if it is still pending. Returns whether anything was
    /// cancelled; cancelling `None` or a stale handle does nothing.
    pub fn cancel(&mut self, handle: Option<TimerHandle>) -> bool {
        match (handle, self.pending) {
            (Some(handle), Some((pending, _))) if handle == pending => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Take the pending wake-up if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<TimerHandle> {
        match self.pending {
            Some((handle, deadline)) if deadline <= now => {
                self.pending = None;
                Some(handle)
            }
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, deadline)| deadline)
    }
}
