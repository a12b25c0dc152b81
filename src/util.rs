use std::{f32::consts::PI, future::Future, time::Duration};

use log::warn;
use simple_error::{SimpleError, SimpleResult};

use crate::params::RetryParams;

/// Maps NaN to zero and infinities to the largest finite value.
pub fn finite(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(f32::MIN, f32::MAX)
    }
}

pub fn bounded(value: f32, bound: f32) -> f32 {
    finite(value).clamp(-bound, bound)
}

/// Signed angle in `(-PI, PI]` to turn from `from` to reach `to` the short way.
pub fn shortest_angle_diff(from: f32, to: f32) -> f32 {
    let diff = (to - from).rem_euclid(2.0 * PI);

    if diff > PI {
        diff - 2.0 * PI
    } else {
        diff
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Runs `attempt` with a per-attempt `timeout`, retrying `retry.max_retries`
/// times with exponential backoff. `what` names the operation in errors and logs.
pub async fn retry_with_backoff<T, F, Fut>(
    what: &str,
    retry: RetryParams,
    timeout: Duration,
    mut attempt: F,
) -> SimpleResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SimpleResult<T>>,
{
    let mut retries = 0;

    loop {
        let result = match tokio::time::timeout(timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(SimpleError::new(format!(
                "{} timed out after {} ms",
                what,
                timeout.as_millis()
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(error) if retries < retry.max_retries => {
                retries += 1;
                let delay = backoff_delay(retry.base_delay(), retries);
                warn!(
                    "{} failed: {}, retry {}/{} in {} ms",
                    what,
                    error,
                    retries,
                    retry.max_retries,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}
