//! Pre-dispatch request guard: replay window and per-app rate limiting.
//!
//! # Invariants
//! - An envelope id is accepted at most once per app inside the replay window.
//! - Only an admitted envelope consumes its id; a rate-limited envelope can be
//!   retried unchanged.
//! - Each app draws from its own token bucket; one noisy app cannot starve
//!   another.

use crate::config::KernelConfig;
use crate::protocol::ErrorCode;
use crate::sync::lock;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GuardSettings {
    pub replay_protection: bool,
    pub replay_window_ms: u64,
    pub clock_skew_ms: u64,
    pub capacity: f64,
    pub refill_per_second: f64,
}

impl From<&KernelConfig> for GuardSettings {
    fn from(config: &KernelConfig) -> Self {
        Self {
            replay_protection: config.replay_protection,
            replay_window_ms: config.replay_window_ms,
            clock_skew_ms: config.clock_skew_ms,
            capacity: f64::from(config.rate_limit_capacity),
            refill_per_second: f64::from(config.rate_limit_refill_per_second),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GuardRejection {
    pub code: ErrorCode,
    pub reason: &'static str,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Default)]
struct GuardState {
    // app id -> envelope id -> wall-clock ms first seen
    seen_ids: HashMap<String, HashMap<String, u64>>,
    buckets: HashMap<String, TokenBucket>,
}

pub(crate) struct RequestGuard {
    settings: GuardSettings,
    state: Mutex<GuardState>,
}

impl RequestGuard {
    pub fn new(settings: GuardSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(GuardState::default()),
        }
    }

    /// Admits or rejects one envelope. `now_ms` is the host wall clock.
    pub fn admit(
        &self,
        app_id: &str,
        envelope_id: &str,
        timestamp: u64,
        now_ms: u64,
    ) -> Result<(), GuardRejection> {
        let mut state = lock(&self.state);
        if self.settings.replay_protection {
            self.check_replay(&mut state, app_id, envelope_id, timestamp, now_ms)?;
        }
        self.take_token(&mut state, app_id)?;
        if self.settings.replay_protection {
            state
                .seen_ids
                .entry(app_id.to_string())
                .or_default()
                .insert(envelope_id.to_string(), now_ms);
        }
        Ok(())
    }

    /// Drops all state kept for `app_id`.
    pub fn forget(&self, app_id: &str) {
        let mut state = lock(&self.state);
        state.seen_ids.remove(app_id);
        state.buckets.remove(app_id);
    }

    fn check_replay(
        &self,
        state: &mut GuardState,
        app_id: &str,
        envelope_id: &str,
        timestamp: u64,
        now_ms: u64,
    ) -> Result<(), GuardRejection> {
        let window = self.settings.replay_window_ms;
        if now_ms.saturating_sub(timestamp) > window {
            return Err(GuardRejection {
                code: ErrorCode::ReplayDetected,
                reason: "Message too old",
            });
        }
        if timestamp.saturating_sub(now_ms) > self.settings.clock_skew_ms {
            return Err(GuardRejection {
                code: ErrorCode::ReplayDetected,
                reason: "Message from future",
            });
        }

        let seen = state.seen_ids.entry(app_id.to_string()).or_default();
        // Ids older than twice the window can no longer pass the age check.
        seen.retain(|_, first_seen| now_ms.saturating_sub(*first_seen) <= window * 2);
        if seen.contains_key(envelope_id) {
            return Err(GuardRejection {
                code: ErrorCode::ReplayDetected,
                reason: "Nonce already used",
            });
        }
        Ok(())
    }

    fn take_token(&self, state: &mut GuardState, app_id: &str) -> Result<(), GuardRejection> {
        let now = Instant::now();
        let capacity = self.settings.capacity;
        let bucket = state
            .buckets
            .entry(app_id.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: capacity,
                last_refill: now,
            });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.settings.refill_per_second).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(GuardRejection {
                code: ErrorCode::RateLimitExceeded,
                reason: "Too many requests. Please slow down.",
            })
        }
    }
}
