use std::collections::HashMap;
use tokio::sync::Mutex;

pub const MAX_FAILED_ATTEMPTS: u32 = 5;
/// Lockout window, counted from the first failed attempt.
pub const LOCKOUT_WINDOW_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy)]
struct FailedAttempts {
    count: u32,
    reset_at: i64,
}

/// Per-client failed-login counters, held for the lifetime of the process.
#[derive(Debug, Default)]
pub struct LoginRateLimiter {
    attempts: Mutex<HashMap<String, FailedAttempts>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds left in the lockout if `client` is currently blocked.
    pub async fn lockout_remaining(&self, client: &str, now: i64) -> Option<i64> {
        let mut attempts = self.attempts.lock().await;
        attempts.retain(|_, entry| entry.reset_at > now);

        attempts
            .get(client)
            .filter(|entry| entry.count >= MAX_FAILED_ATTEMPTS)
            .map(|entry| entry.reset_at - now)
    }

    pub async fn record_failure(&self, client: &str, now: i64) {
        let mut attempts = self.attempts.lock().await;
        let entry = attempts
            .entry(client.to_string())
            .or_insert(FailedAttempts {
                count: 0,
                reset_at: now + LOCKOUT_WINDOW_SECS,
            });
        if entry.reset_at <= now {
            *entry = FailedAttempts {
                count: 0,
                reset_at: now + LOCKOUT_WINDOW_SECS,
            };
        }
        entry.count += 1;
    }

    pub async fn record_success(&self, client: &str) {
        self.attempts.lock().await.remove(client);
    }
}
