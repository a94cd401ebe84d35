//! Provider orchestration.
//!
//! This module provides:
//! - Per-provider rate limiting with a rolling 60 s quota and jitter
//! - Circuit breaking for fault tolerance
//! - Bounded retry with exponential backoff
//! - Failover across providers with aggregated diagnostics

mod circuit_breaker;
mod diagnostics;
mod manager;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{CircuitBreakerConfig, CircuitState};
pub use diagnostics::{FailoverReport, FetchDiagnostics, ProviderFailure, SkipReason};
pub use manager::{FetcherManager, ManagerSettings, DEFAULT_MAX_WORKERS};
pub use rate_limiter::{CircuitPermit, QuotaWindow, RateLimiter, QUOTA_WINDOW};
pub use retry::{RetryExhausted, RetryPolicy, DEFAULT_CALL_TIMEOUT};
