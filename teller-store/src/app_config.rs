use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub identity: IdentitySettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub booking: BookingSettings,
    #[serde(default)]
    pub events: EventSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_booking_topic")]
    pub booking_topic: String,
}

fn default_booking_topic() -> String {
    "booking-lifecycle".to_string()
}

/// Resilience tuning for the identity provider. Durations are integer
/// milliseconds in config files and converted at wiring time.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdentitySettings {
    pub call_timeout_ms: u64,
    pub breaker: BreakerSettings,
    pub retry: RetrySettings,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 2_000,
            breaker: BreakerSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerSettings {
    /// Fraction of failures in the trailing window that trips the breaker
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub minimum_calls: usize,
    pub open_cooldown_ms: u64,
    pub half_open_max_calls: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.65,
            sliding_window_size: 10,
            minimum_calls: 5,
            open_cooldown_ms: 30_000,
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 300,
            multiplier: 2.0,
            jitter: 0.3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_ms: u64,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            max_entries: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BookingSettings {
    /// Overall budget for the identity-provisioning step of one booking
    pub provisioning_deadline_ms: u64,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            provisioning_deadline_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EventSettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Layer the current environment file on top (optional)
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Environment wins, e.g. TELLER__DATABASE__URL=...
            .add_source(config::Environment::with_prefix("TELLER").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
