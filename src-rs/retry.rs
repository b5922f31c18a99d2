use std::error::Error;
use std::time::Duration;

use tracing::{error, info};

use crate::error::RetryError;
use crate::sleep::Sleeper;

/// Calls `attempt` with a 1-based attempt number until it succeeds or
/// `max_attempts` calls have failed. Sleeps `delay` between failures only.
pub fn run_with_retry<T, E, F>(
    max_attempts: u32,
    delay: Duration,
    sleeper: &dyn Sleeper,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    E: Error + 'static,
    F: FnMut(u32) -> Result<T, E>,
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;
    loop {
        info!("attempt {n}/{max_attempts}");
        match attempt(n) {
            Ok(value) => return Ok(value),
            Err(err) if n < max_attempts => {
                error!(error = %err, "attempt {n}/{max_attempts} failed, retrying in {delay:?}");
                sleeper.sleep(delay);
                n += 1;
            }
            Err(err) => {
                error!(error = %err, "attempt {n}/{max_attempts} failed, giving up");
                return Err(RetryError {
                    attempts: n,
                    last: err,
                });
            }
        }
    }
}
