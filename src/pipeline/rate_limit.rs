// Randomized pacing between consecutive network fetches

use std::time::Duration;

use rand::Rng;
use tracing::info;

use super::cancel::CancellationToken;

pub struct RateLimiter {
    min: Duration,
    max: Duration,
    fetched_before: bool,
}

impl RateLimiter {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max,
            fetched_before: false,
        }
    }

    /// Random pause drawn uniformly from the window
    pub fn next_delay(&self) -> Duration {
        if self.max.is_zero() || self.min == self.max {
            return self.min;
        }
        let millis = rand::rng().random_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(millis as u64)
    }

    /// Call before every new fetch. The first fetch of a run goes straight through;
    /// later ones wait. Returns `false` if cancelled while waiting.
    pub async fn wait_turn(&mut self, cancel: &CancellationToken) -> bool {
        if !self.fetched_before {
            self.fetched_before = true;
            return !cancel.is_cancelled();
        }

        let delay = self.next_delay();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }

        info!(wait_secs = delay.as_secs_f64(), "waiting before next fetch");
        tokio::select! {
            _ = tokio::time::sleep(delay) => !cancel.is_cancelled(),
            _ = cancel.cancelled() => false,
        }
    }
}
