//! Per-user fixed-window quota.
//!
//! Manual re-checks are limited per acting user per window. A request over
//! the limit fails immediately with the time until the window resets; it is
//! never queued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_MANUAL_CHECKS_PER_MINUTE: u32 = 10;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Too many manual checks; retry in {}s", retry_after_secs(.retry_after))]
pub struct QuotaExceeded {
    pub retry_after: Duration,
}

fn retry_after_secs(d: &Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    used: u32,
}

/// In-memory per-user quota.
#[derive(Debug, Clone)]
pub struct ManualCheckQuota {
    limit: u32,
    window: Duration,
    users: Arc<Mutex<HashMap<i32, Window>>>,
}

impl ManualCheckQuota {
    /// Allow `per_minute` checks per user per minute.
    pub fn new(per_minute: u32) -> Self {
        Self::with_window(per_minute, WINDOW)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            users: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Take one slot for `user_id`, returning how many remain.
    pub async fn try_acquire(&self, user_id: i32) -> Result<u32, QuotaExceeded> {
        let now = Instant::now();
        let mut users = self.users.lock().await;
        let entry = users.entry(user_id).or_insert(Window {
            started: now,
            used: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                used: 0,
            };
        }

        if entry.used >= self.limit {
            let retry_after = self.window.saturating_sub(now.duration_since(entry.started));
            debug!("User {} over manual check quota", user_id);
            return Err(QuotaExceeded { retry_after });
        }

        entry.used += 1;
        Ok(self.limit - entry.used)
    }

    /// Slots left in the current window.
    pub async fn remaining(&self, user_id: i32) -> u32 {
        let users = self.users.lock().await;
        match users.get(&user_id) {
            Some(w) if w.started.elapsed() < self.window => self.limit.saturating_sub(w.used),
            _ => self.limit,
        }
    }
}

impl Default for ManualCheckQuota {
    fn default() -> Self {
        Self::new(DEFAULT_MANUAL_CHECKS_PER_MINUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fails_fast_when_exhausted() {
        let quota = ManualCheckQuota::new(2);
        assert_eq!(quota.try_acquire(1).await, Ok(1));
        assert_eq!(quota.try_acquire(1).await, Ok(0));

        let err = quota.try_acquire(1).await.unwrap_err();
        assert!(err.retry_after <= Duration::from_secs(60));
        assert!(err.retry_after > Duration::ZERO);
        assert!(err.to_string().contains("retry in"));

        // Other users are unaffected.
        assert_eq!(quota.try_acquire(2).await, Ok(1));
        assert_eq!(quota.remaining(1).await, 0);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let quota = ManualCheckQuota::with_window(1, Duration::from_millis(30));
        quota.try_acquire(7).await.unwrap();
        assert!(quota.try_acquire(7).await.is_err());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(quota.remaining(7).await, 1);
        assert!(quota.try_acquire(7).await.is_ok());
    }
}
