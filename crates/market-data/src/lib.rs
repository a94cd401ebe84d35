//! Watchlist Market Data Crate
//!
//! This crate is the data-source strategy layer of the watchlist analyzer:
//! it fetches basic info, daily bars and realtime quotes for A-share (and
//! selected foreign) symbols from several independent vendors, failing over
//! between them and pacing calls so no vendor blocks the process.
//!
//! # Overview
//!
//! - Multiple providers: Eastmoney, Tushare Pro, Yahoo Finance
//! - One normalized payload schema regardless of vendor (volume in shares,
//!   amounts in currency units, bars ascending by date)
//! - Per-provider rolling quota, anti-blocking jitter and circuit breaking
//! - Bounded retry with exponential backoff, then failover by priority
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  FetchRequest    |  (capability + symbol)
//! +------------------+
//!          |
//!          v
//! +------------------+     ordered by priority, circuit-open ones skipped
//! |  FetcherManager  | --> +------------------+
//! +------------------+     |   RetryPolicy    |  (per provider)
//!          |               +------------------+
//!          |                        |
//!          |                        v
//!          |               +------------------+
//!          |               |   RateLimiter    |  (quota window + jitter)
//!          |               +------------------+
//!          |                        |
//!          |                        v
//!          |               +------------------+
//!          |               |    Provider      |  (Eastmoney, Tushare, Yahoo)
//!          |               +------------------+
//!          v
//! +------------------+
//! |   FetchResult    |  or AllProvidersFailed / DeadlineExceeded
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`FetchRequest`] - What to fetch, for which symbol
//! - [`FetchResult`] / [`Payload`] - Normalized outcome
//! - [`FetcherManager`] - Failover orchestration and batch worker pool
//! - [`MarketDataConfig`] - Environment-driven settings
//! - [`MarketDataError`] - Error type with retry classification

pub mod config;
pub mod credentials;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod watchlist;

pub use config::{ConfigError, MarketDataConfig, ProviderSettings};
pub use credentials::CredentialCache;
pub use errors::{MarketDataError, RetryClass};

// Re-export all public types from models
pub use models::{
    Capability, DailyBar, DateRange, Exchange, FetchRequest, FetchResult, Payload, ProviderId,
    RealtimeQuote, StockBasicInfo, StockCode,
};

// Re-export provider types
pub use provider::eastmoney::EastmoneyProvider;
pub use provider::tushare::TushareProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::{JitterRange, MarketDataProvider, ProviderCapabilities, ProviderKind, RateLimit};

// Re-export registry types
pub use registry::{
    CircuitBreakerConfig, CircuitPermit, CircuitState, FailoverReport, FetchDiagnostics,
    FetcherManager, ManagerSettings, ProviderFailure, QuotaWindow, RateLimiter, RetryExhausted,
    RetryPolicy, SkipReason, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_WORKERS, QUOTA_WINDOW,
};

pub use watchlist::{EnvWatchlist, StaticWatchlist, WatchlistSource, FALLBACK_SYMBOL};
