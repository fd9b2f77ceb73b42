use std::time::{Duration, Instant};

/// Per-connection fixed-window message counter.
///
/// A counter plus a reset deadline: when the deadline passes, the counter
/// starts over. The window is approximate; a burst straddling a window
/// boundary can see up to twice the configured maximum.
pub struct FixedWindowLimiter {
    count: u32,
    max: u32,
    window: Duration,
    reset_at: Instant,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            count: 0,
            max,
            window,
            reset_at: Instant::now() + window,
        }
    }

    /// Count one message. Returns `false` when the window budget is
    /// spent; the caller drops the message (no queueing, no retry).
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = now + self.window;
        }
        self.count = self.count.saturating_add(1);
        self.count <= self.max
    }
}
