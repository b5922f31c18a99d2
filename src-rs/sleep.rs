use std::thread;
use std::time::Duration;

use tracing::trace;

/// Fixed settle waits between UI actions.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        trace!(ms = duration.as_millis() as u64, "sleep");
        thread::sleep(duration);
    }
}
