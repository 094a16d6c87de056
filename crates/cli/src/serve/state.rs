//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use goldi_pipeline::WorkflowRunner;
use goldi_storage::InMemoryStorage;
use tokio::sync::Mutex;

use super::RATE_LIMIT_WINDOW_SECS;

/// Per-IP request tracker: (request count, window start time).
type IpTracker = HashMap<IpAddr, (u64, Instant)>;

/// In-memory per-IP rate limiter.
pub(crate) struct RateLimiter {
    tracker: Mutex<IpTracker>,
    /// Maximum requests per window.
    pub(crate) max_requests: u64,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64) -> Self {
        Self {
            tracker: Mutex::new(HashMap::new()),
            max_requests,
        }
    }

    /// Returns `Err(retry_after_secs)` once `ip` has used up its window.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let mut tracker = self.tracker.lock().await;
        let now = Instant::now();

        let entry = tracker.entry(ip).or_insert((0, now));

        let elapsed = now.duration_since(entry.1).as_secs();
        if elapsed >= RATE_LIMIT_WINDOW_SECS {
            entry.0 = 0;
            entry.1 = now;
        }

        entry.0 += 1;
        if entry.0 > self.max_requests {
            Err(RATE_LIMIT_WINDOW_SECS.saturating_sub(elapsed))
        } else {
            Ok(())
        }
    }
}

/// Shared across request handlers.
pub(crate) struct AppState {
    pub(crate) runner: WorkflowRunner<InMemoryStorage>,
    pub(crate) rate_limiter: RateLimiter,
}
