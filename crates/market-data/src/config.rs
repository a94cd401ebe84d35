//! Environment-driven configuration for the data layer.
//!
//! Loaded once at startup (`.env` first, then the process environment) and
//! passed by value; nothing here is global or reloaded.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use log::warn;
use thiserror::Error;

use crate::errors::MarketDataError;
use crate::provider::{JitterRange, ProviderKind, RateLimit};
use crate::registry::{CircuitBreakerConfig, RetryPolicy, DEFAULT_CALL_TIMEOUT};
use crate::watchlist::StaticWatchlist;

/// Watchlist used when `STOCK_LIST` is empty.
pub const DEFAULT_STOCK_LIST: [&str; 3] = ["600519", "000001", "300750"];

/// A configuration value that could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl From<ConfigError> for MarketDataError {
    fn from(err: ConfigError) -> Self {
        MarketDataError::Config(err.to_string())
    }
}

/// Resolved settings for one provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Lower is tried first.
    pub priority: u8,
    /// Attempts per request, including the first.
    pub max_retries: u32,
    /// Per-call timeout.
    pub request_timeout: Duration,
    pub rate_limit: RateLimit,
}

/// Data layer configuration.
#[derive(Clone, Debug)]
pub struct MarketDataConfig {
    pub stock_list: Vec<String>,
    pub tushare_token: Option<String>,
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub request_timeout: Duration,
    /// Budget for one request across all providers.
    pub fetch_deadline: Option<Duration>,
    /// `None` disables circuit breaking.
    pub circuit_failure_threshold: Option<u32>,
    pub circuit_cooldown: Duration,
    pub eastmoney: ProviderSettings,
    pub tushare: ProviderSettings,
    pub yahoo: ProviderSettings,
}

/// Typed reads over a key lookup.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            None => Ok(None),
            Some(value) => value.parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    fn secs(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        match self.parse::<f64>(key)? {
            None => Ok(None),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|_| ConfigError::Invalid {
                    key: key.to_string(),
                    value: secs.to_string(),
                    reason: "expected a non-negative number of seconds".to_string(),
                }),
        }
    }

    fn secs_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self.secs(key)?.unwrap_or(default))
    }

    fn flag_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value,
                    reason: "expected true or false".to_string(),
                }),
            },
        }
    }
}

/// Per-provider defaults before overrides.
struct ProviderDefaults {
    priority: u8,
    requests_per_minute: Option<u32>,
    jitter: Option<JitterRange>,
}

impl MarketDataConfig {
    /// Load `.env` (if present), then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let mut stock_list: Vec<String> = env
            .raw("STOCK_LIST")
            .unwrap_or_default()
            .split(',')
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .collect();
        if stock_list.is_empty() {
            stock_list = DEFAULT_STOCK_LIST.iter().map(|s| s.to_string()).collect();
        }

        let max_retries = env.parse_or("MAX_RETRIES", 3u32)?;
        let request_timeout = env.secs_or("REQUEST_TIMEOUT", DEFAULT_CALL_TIMEOUT)?;

        let sleep_min = env.secs_or("AKSHARE_SLEEP_MIN", Duration::from_secs(2))?;
        let sleep_max = env.secs_or("AKSHARE_SLEEP_MAX", Duration::from_secs(5))?;
        let eastmoney_jitter = JitterRange::from_secs_f64(sleep_min.as_secs_f64(), sleep_max.as_secs_f64());

        let provider = |kind: ProviderKind, defaults: ProviderDefaults| {
            Self::provider_settings(&env, kind, defaults, max_retries, request_timeout)
        };

        let eastmoney = provider(
            ProviderKind::Eastmoney,
            ProviderDefaults {
                priority: 1,
                requests_per_minute: None,
                jitter: Some(eastmoney_jitter),
            },
        )?;
        let tushare = provider(
            ProviderKind::Tushare,
            ProviderDefaults {
                priority: 2,
                requests_per_minute: Some(80),
                jitter: None,
            },
        )?;
        let yahoo = provider(
            ProviderKind::Yahoo,
            ProviderDefaults {
                priority: 3,
                requests_per_minute: Some(60),
                jitter: None,
            },
        )?;

        let circuit_failure_threshold = match env.parse::<u32>("CIRCUIT_FAILURE_THRESHOLD")? {
            Some(0) => None,
            Some(n) => Some(n),
            None => CircuitBreakerConfig::default().failure_threshold,
        };

        Ok(Self {
            stock_list,
            tushare_token: env.raw("TUSHARE_TOKEN"),
            max_workers: env.parse_or("MAX_WORKERS", 3usize)?.max(1),
            max_retries,
            retry_base_delay: env.secs_or("RETRY_BASE_DELAY", Duration::from_secs(1))?,
            retry_max_delay: env.secs_or("RETRY_MAX_DELAY", Duration::from_secs(30))?,
            request_timeout,
            fetch_deadline: env.secs("FETCH_DEADLINE_SECS")?.filter(|d| !d.is_zero()),
            circuit_failure_threshold,
            circuit_cooldown: env.secs_or(
                "CIRCUIT_COOLDOWN_SECS",
                CircuitBreakerConfig::default().cooldown,
            )?,
            eastmoney,
            tushare,
            yahoo,
        })
    }

    fn provider_settings<F>(
        env: &EnvReader<F>,
        kind: ProviderKind,
        defaults: ProviderDefaults,
        max_retries: u32,
        request_timeout: Duration,
    ) -> Result<ProviderSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = kind.env_prefix();
        let key = |suffix: &str| format!("{}_{}", prefix, suffix);

        let requests_per_minute = match env.parse::<u32>(&key("RATE_LIMIT_PER_MINUTE"))? {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.requests_per_minute,
        };

        Ok(ProviderSettings {
            enabled: env.flag_or(&key("ENABLED"), true)?,
            priority: env.parse_or(&key("PRIORITY"), defaults.priority)?,
            max_retries: env.parse_or(&key("MAX_RETRIES"), max_retries)?,
            request_timeout: env.secs_or(&key("REQUEST_TIMEOUT"), request_timeout)?,
            rate_limit: RateLimit {
                requests_per_minute,
                jitter: defaults.jitter,
            },
        })
    }

    pub fn settings_for(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Eastmoney => &self.eastmoney,
            ProviderKind::Tushare => &self.tushare,
            ProviderKind::Yahoo => &self.yahoo,
        }
    }

    /// Retry policy for one provider: its own attempt budget and timeout,
    /// the shared backoff curve.
    pub fn retry_policy_for(&self, kind: ProviderKind) -> RetryPolicy {
        let settings = self.settings_for(kind);
        RetryPolicy::new(settings.max_retries, self.retry_base_delay, self.retry_max_delay)
            .with_call_timeout(Some(settings.request_timeout))
    }

    pub fn default_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay, self.retry_max_delay)
            .with_call_timeout(Some(self.request_timeout))
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_failure_threshold,
            cooldown: self.circuit_cooldown,
        }
    }

    pub fn watchlist(&self) -> StaticWatchlist {
        StaticWatchlist::new(self.stock_list.clone())
    }

    /// Check for settings that load fine but will not work as expected.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.tushare.enabled && self.tushare_token.is_none() {
            warnings.push(
                "TUSHARE_TOKEN not set, Tushare provider will not be registered".to_string(),
            );
        }
        if ProviderKind::ALL
            .iter()
            .all(|kind| !self.settings_for(*kind).enabled)
        {
            warnings.push("All providers are disabled, every fetch will fail".to_string());
        }
        if self.retry_base_delay > self.retry_max_delay {
            warnings.push(format!(
                "RETRY_BASE_DELAY ({:?}) exceeds RETRY_MAX_DELAY ({:?}), every backoff is capped",
                self.retry_base_delay, self.retry_max_delay
            ));
        }
        if self.max_workers > 10 {
            warnings.push(format!(
                "MAX_WORKERS={} is high and may get the process blocked by vendors",
                self.max_workers
            ));
        }

        for warning in &warnings {
            warn!("Config: {}", warning);
        }
        warnings
    }
}
