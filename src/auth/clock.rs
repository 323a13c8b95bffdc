use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source used by the auth components.
///
/// Production code runs on [`SystemClock`]; tests drive [`ManualClock`]
/// to cross TTL and lockout boundaries without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real thing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same offset.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += step;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.base + offset
    }
}
