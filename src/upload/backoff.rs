//! Retry delay computation
//!
//! After a failed request the next step waits at least the base error delay,
//! minus a random share of up to `jitter_ratio` so that many clients failing
//! together do not retry in lockstep. The random source is injectable so the
//! delay is reproducible in tests.

use rand::Rng;
use std::time::Duration;

/// Source of jitter samples, uniformly distributed in `[0, 1)`
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Jitter drawn from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Always returns the same sample
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Delay before retrying a failed request
///
/// The undithered delay is the larger of the time left until
/// `last_request_end_millis + error_delay` and `error_delay` itself; up to
/// `jitter_ratio` of it is then removed according to `sample`.
pub fn retry_delay(
    error_delay: Duration,
    last_request_end_millis: i64,
    now_millis: i64,
    jitter_ratio: f64,
    sample: f64,
) -> Duration {
    let base = error_delay.as_millis() as f64;
    let remaining = (last_request_end_millis as f64) + base - (now_millis as f64);
    let delay = remaining.max(base);
    if delay <= 0.0 {
        return Duration::ZERO;
    }

    let sample = sample.clamp(0.0, 1.0);
    let jittered = delay - delay * jitter_ratio * sample;
    Duration::from_millis(jittered.max(0.0) as u64)
}
