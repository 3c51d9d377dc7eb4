use std::time::Duration;

use rand::Rng;

/// Bounded retry with exponential backoff and jitter.
///
/// Shared by the identity gateway and the event relay; both retry only
/// transient failures and surface the last error once the budget is spent.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    /// Uniform jitter as a fraction of the exponential base (0.3 = ±30%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(300),
            multiplier: 2.0,
            jitter: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the `attempt`-th failure (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        // exponent is capped so a misconfigured attempt count cannot overflow
        let exp = attempt.saturating_sub(1).min(16) as i32;
        let base = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        let jittered = if self.jitter > 0.0 {
            let span = base * self.jitter;
            base + rand::thread_rng().gen_range(-span..=span)
        } else {
            base
        };
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
