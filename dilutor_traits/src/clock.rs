use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wall-clock abstraction for the tick driver.
///
/// The interval state machine measures elapsed time between process
/// invocations, so this is wall-clock time, not a monotonic instant:
/// the durable reference point lives in the block log, not in memory.
///
/// - now(): current UTC time
/// - sleep(): sleeps for the provided duration (implementations may simulate)
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, d: Duration);
}

/// Default clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}
