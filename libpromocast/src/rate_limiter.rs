//! Per-platform call budgets
//!
//! Fixed windows aligned to the epoch: a window of `W` seconds containing
//! timestamp `t` starts at `floor(t / W) * W`. Each platform keeps only the
//! counter of its current window.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::RateLimitSpec;

/// Decision for one publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A call slot was taken
    Granted,
    /// Budget exhausted until `window_reset`
    Deferred { window_reset: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: i64,
    count: u32,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the budget and take a slot in one step.
    ///
    /// Platforms without a limit are always granted and not tracked.
    pub async fn try_acquire(
        &self,
        platform: &str,
        limit: Option<&RateLimitSpec>,
        now: DateTime<Utc>,
    ) -> Admission {
        let Some(limit) = limit else {
            return Admission::Granted;
        };
        let window_secs = limit.window_secs.max(1) as i64;
        let start = window_start(now.timestamp(), window_secs);

        let mut windows = self.windows.lock().await;
        let window = windows
            .entry(platform.to_string())
            .or_insert(Window { start, count: 0 });
        if window.start != start {
            *window = Window { start, count: 0 };
        }

        if window.count < limit.max_calls {
            window.count += 1;
            debug!(platform, used = window.count, max = limit.max_calls, "Rate limit slot taken");
            return Admission::Granted;
        }

        let window_reset = DateTime::from_timestamp(start + window_secs, 0).unwrap_or(now);
        debug!(platform, %window_reset, "Rate limit exhausted");
        Admission::Deferred { window_reset }
    }

    /// Calls counted in the window containing `now`
    pub async fn usage(&self, platform: &str, limit: &RateLimitSpec, now: DateTime<Utc>) -> u32 {
        let start = window_start(now.timestamp(), limit.window_secs.max(1) as i64);
        self.windows
            .lock()
            .await
            .get(platform)
            .filter(|window| window.start == start)
            .map_or(0, |window| window.count)
    }
}

/// Start of the window of `window_secs` containing `timestamp`
fn window_start(timestamp: i64, window_secs: i64) -> i64 {
    timestamp.div_euclid(window_secs) * window_secs
}
