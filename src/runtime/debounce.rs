use std::time::{Duration, Instant};

/// Drops refresh requests that arrive within `window` of the last accepted one.
#[derive(Debug)]
pub struct RefreshDebouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl RefreshDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    pub fn try_accept(&mut self) -> bool {
        self.try_accept_at(Instant::now())
    }

    pub fn try_accept_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted
            && now.saturating_duration_since(last) <= self.window
        {
            return false;
        }
        self.last_accepted = Some(now);
        true
    }
}
