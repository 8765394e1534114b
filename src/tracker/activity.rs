use std::time::Duration;

use tokio::time::Instant;

/// Remembers when the user last did something.
pub struct ActivityMonitor {
    last_activity: Instant,
}

impl ActivityMonitor {
    pub fn new(now: Instant) -> Self {
        Self { last_activity: now }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// True once strictly more than `threshold` has passed since the last activity.
    pub fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > threshold
    }
}
