use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::auth::clock::Clock;

/// Failure-counting knobs. [`Default`] matches the production service.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    /// Failures inside one window that trip a lock
    pub max_failures: u32,
    /// Length of the failure-counting window
    pub failure_window: Duration,
    /// How long a tripped lock lasts
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            failure_window: Duration::from_secs(10 * 60),
            lock_duration: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureState {
    attempts: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

/// Windowed failure counter with a fixed-length lock per key.
///
/// Keys are whatever the caller throttles on; the auth service keeps one
/// tracker for usernames and a separate one for source addresses.
pub struct LockoutTracker {
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, FailureState>>,
}

impl LockoutTracker {
    pub fn new(policy: LockoutPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Count one failure against `key`. The whole read-modify-write runs
    /// under the map lock, so concurrent failures cannot under-count.
    pub fn record_failure(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        let now = self.clock.now();
        if let Ok(mut entries) = self.entries.lock() {
            let state = entries.entry(key.to_string()).or_insert(FailureState {
                attempts: 0,
                window_start: now,
                locked_until: None,
            });
            // A standing lock keeps its original deadline; failures made
            // while locked neither extend nor reset it.
            if state.locked_until.is_some_and(|until| now < until) {
                return;
            }
            if now.duration_since(state.window_start) > self.policy.failure_window {
                state.attempts = 0;
                state.window_start = now;
            }
            state.attempts += 1;
            if state.attempts >= self.policy.max_failures {
                state.locked_until = Some(now + self.policy.lock_duration);
                state.attempts = 0;
                state.window_start = now;
            }
        }
    }

    /// Forget everything known about `key`.
    pub fn clear(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    /// Whether `key` is currently locked. Read-only.
    pub fn is_locked(&self, key: &str) -> bool {
        self.locked_remaining(key).is_some()
    }

    /// Time left on the lock for `key`, `None` when not locked. Read-only.
    pub fn locked_remaining(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().ok()?;
        let state = entries.get(key)?;
        match state.locked_until {
            Some(until) if now < until => Some(until - now),
            _ => None,
        }
    }
}
