//! Blocking delays used by the display protocol.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Something that can block the calling thread.
///
/// Every delay in the HD44780 protocol is a minimum from the datasheet, so implementations may
/// oversleep but must never return early.
pub trait Clock: Debug + Send + Sync {
    fn sleep_at_least(&self, duration: Duration);
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn sleep_at_least(&self, duration: Duration) {
        (**self).sleep_at_least(duration)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn sleep_at_least(&self, duration: Duration) {
        (**self).sleep_at_least(duration)
    }
}

/// Sleeps using the OS scheduler, which never wakes a thread before the requested time.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep_at_least(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A clock that only advances when slept on. Lets tests run the full protocol without waiting
/// and check the delays that were requested.
#[derive(Debug, Default)]
pub struct VirtualClock {
    elapsed_ns: AtomicU64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time slept so far.
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::SeqCst))
    }
}

impl Clock for VirtualClock {
    fn sleep_at_least(&self, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_ns.fetch_add(ns, Ordering::SeqCst);
        // Give other threads a chance to run, like a real sleep would.
        thread::yield_now();
    }
}
