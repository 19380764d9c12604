use std::sync::Mutex;
use std::time::Instant;

/// Source of monotonic milliseconds for span timing and duration math.
///
/// Durations are `f64` milliseconds measured against an arbitrary origin;
/// wall-clock stamps on records use `chrono` separately.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Production clock backed by `Instant`, anchored at construction.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-advanced clock for tests that assert exact durations.
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        ManualClock {
            now: Mutex::new(start_ms),
        }
    }

    pub fn advance(&self, ms: f64) {
        *self.now.lock().unwrap() += ms;
    }

    pub fn set(&self, ms: f64) {
        *self.now.lock().unwrap() = ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}
