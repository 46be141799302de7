//! Exponential backoff with jitter for retryable FCM replies
use rand::Rng;
use std::time::Duration;

/// Starting point of the exponential curve when `min` is zero
pub const MIN_BACKOFF_SEED: Duration = Duration::from_millis(1);

/// Backoff bounds and growth, passed by value into the client
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// First delay, and the floor for every delay
    pub min: Duration,
    /// Ceiling for every delay
    pub max: Duration,
    /// Growth factor between consecutive delays
    pub factor: f64,
    /// Randomize each delay between the previous one and the exponential target
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            ..Default::default()
        }
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Fresh generator for one logical send.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
            last: Duration::ZERO,
        }
    }
}

/// Stateful delay generator
///
/// Delays never decrease between resets and always stay within
/// `[policy.min, policy.max]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let min = self.policy.min;
        let max = self.policy.max.max(min);
        let factor = if self.policy.factor.is_finite() && self.policy.factor > 1.0 {
            self.policy.factor
        } else {
            1.0
        };

        let seed = min.max(MIN_BACKOFF_SEED).min(max);
        let exp = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let target_nanos = (seed.as_nanos() as f64 * factor.powi(exp))
            .min(max.as_nanos() as f64)
            .round();
        let target = Duration::from_nanos(target_nanos as u64).clamp(min, max);
        let floor = self.last.clamp(min, target);

        let delay = if self.policy.jitter && target > floor {
            let nanos = rand::thread_rng()
                .gen_range(floor.as_nanos() as u64..=target.as_nanos() as u64);
            Duration::from_nanos(nanos)
        } else {
            target
        };

        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
