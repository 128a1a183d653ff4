//! Time source for pulses and tick scheduling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time plus blocking sleep. Shared by the two axis threads of a
/// dispatch, so implementations must be `Sync`.
pub trait Clock: Send + Sync {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;

    /// Block until `elapsed()` reaches `deadline`.
    fn sleep_until(&self, deadline: Duration);

    fn sleep(&self, duration: Duration) {
        self.sleep_until(self.elapsed() + duration);
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let remaining = deadline.saturating_sub(self.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

/// Virtual clock: sleeping returns immediately and moves time forward to the
/// deadline. Concurrent sleeps toward the same deadline overlap.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now_us: AtomicU64,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now_us
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn elapsed(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::SeqCst))
    }

    fn sleep_until(&self, deadline: Duration) {
        self.now_us
            .fetch_max(deadline.as_micros() as u64, Ordering::SeqCst);
    }
}
