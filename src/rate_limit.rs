//! Rate budget (`spec.md` §3's `RateBudget`): a fixed-rate barrier with a
//! one-second window and a maximum-operations-per-window value, mutated by
//! the engine before each dispatch.

use std::time::Duration;

use tokio::time::Instant;

/// A simple leaky-bucket-by-second limiter. Not shared across threads (the
/// engine is single-threaded, `spec.md` §5), so no synchronization beyond
/// `&mut self` is needed.
#[derive(Debug)]
pub struct RateBudget {
    max_per_window: u32,
    window_start: Instant,
    used_in_window: u32,
}

impl RateBudget {
    pub fn new(max_per_window: u32) -> RateBudget {
        RateBudget {
            max_per_window,
            window_start: Instant::now(),
            used_in_window: 0,
        }
    }

    /// Block until the budget allows one more operation, then consume it.
    ///
    /// Mirrors `spec.md` §4.8 step 1: called once per dispatched operation,
    /// except for the outer loop iteration of a bulk-modify pass, whose
    /// inner search-result handler calls it per modified entry instead
    /// (`spec.md` §3's note on `RateBudget`).
    pub async fn wait(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.used_in_window = 0;
        }
        if self.used_in_window >= self.max_per_window {
            let remaining = Duration::from_secs(1) - now.duration_since(self.window_start);
            tokio::time::sleep(remaining).await;
            self.window_start = Instant::now();
            self.used_in_window = 0;
        }
        self.used_in_window += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_configured_rate_without_sleeping() {
        let mut budget = RateBudget::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            budget.wait().await;
        }
        assert!(Instant::now().duration_since(start) < Duration::from_millis(500));
    }
}
