use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker tuning. The failure rate is evaluated over a count-based sliding
/// window once `minimum_calls` outcomes have been recorded.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub minimum_calls: usize,
    pub open_cooldown: Duration,
    pub half_open_max_calls: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.65,
            sliding_window_size: 10,
            minimum_calls: 5,
            open_cooldown: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation, calls go out
    Open,     // Failing fast, no calls go out until the cool-down elapses
    HalfOpen, // Probing recovery with a bounded number of trial calls
}

struct BreakerInner {
    state: CircuitState,
    // true = failure, oldest outcome at the front
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probes_started: usize,
    probes_succeeded: usize,
}

/// Process-wide circuit breaker for one downstream endpoint.
///
/// Callers ask for admission with `try_acquire` and report the outcome with
/// `record_success` / `record_failure`. The Open to Half-Open transition
/// happens lazily inside `try_acquire` once the cool-down has elapsed.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                probes_started: 0,
                probes_succeeded: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Whether a call may go out right now. While Half-Open, at most
    /// `half_open_max_calls` probes are admitted.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_cooldown)
                    .unwrap_or(true);
                if !cooled_down {
                    return false;
                }
                inner.state = CircuitState::HalfOpen;
                inner.probes_started = 1;
                inner.probes_succeeded = 0;
                tracing::info!("Circuit Breaker [{}] moving to Half-Open", self.name);
                true
            }
            CircuitState::HalfOpen => {
                if inner.probes_started < self.config.half_open_max_calls {
                    inner.probes_started += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut inner.window, false, self.config.sliding_window_size);
            }
            CircuitState::HalfOpen => {
                inner.probes_succeeded += 1;
                if inner.probes_succeeded >= self.config.half_open_max_calls {
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.opened_at = None;
                    tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut inner.window, true, self.config.sliding_window_size);
                let calls = inner.window.len();
                if calls < self.config.minimum_calls {
                    return;
                }
                let failures = inner.window.iter().filter(|failed| **failed).count();
                let rate = failures as f64 / calls as f64;
                if rate >= self.config.failure_rate_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::error!(
                        "Circuit Breaker [{}] TRIPPED to Open. Failures: {}/{}",
                        self.name,
                        failures,
                        calls
                    );
                }
            }
            CircuitState::HalfOpen => {
                // A single failed probe sends the breaker straight back to Open.
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::error!(
                    "Circuit Breaker [{}] TRIPPED to Open. Probe call failed",
                    self.name
                );
            }
            CircuitState::Open => {}
        }
    }

    fn push_outcome(window: &mut VecDeque<bool>, failed: bool, size: usize) {
        window.push_back(failed);
        while window.len() > size {
            window.pop_front();
        }
    }
}
