//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

use crate::models::Capability;
use crate::registry::FailoverReport;

/// Errors that can occur during market data operations.
///
/// Each variant is classified into a [`RetryClass`] via the [`retry_class`](Self::retry_class)
/// method, which determines how the retry policy and the manager handle it.
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    /// The provider call did not complete within the per-call timeout.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider could not be reached (DNS, TCP, TLS, broken body).
    #[error("Connection error: {provider} - {message}")]
    Connection { provider: String, message: String },

    /// The provider answered with a non-success HTTP status.
    #[error("HTTP {status}: {provider} - {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// The provider rejected the call because of its own rate limit
    /// (HTTP 429 or a vendor-specific quota error code).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// Credentials were rejected by the provider.
    #[error("Authentication failed: {provider} - {message}")]
    Authentication { provider: String, message: String },

    /// The provider rejected the request as malformed.
    #[error("Invalid request: {provider} - {message}")]
    InvalidRequest { provider: String, message: String },

    /// The provider's response could not be parsed or normalized.
    #[error("Parse error: {provider} - {message}")]
    Parse { provider: String, message: String },

    /// The provider does not cover this symbol (e.g. a foreign ticker on a
    /// mainland-only vendor).
    #[error("Symbol not supported: {provider} - {symbol}")]
    SymbolNotSupported { provider: String, symbol: String },

    /// The provider was asked for a capability it does not declare.
    #[error("Capability not supported: {provider} - {capability}")]
    CapabilityNotSupported {
        provider: String,
        capability: Capability,
    },

    /// The provider returned no data for the symbol / range.
    #[error("No data: {provider} - {symbol}")]
    NoData { provider: String, symbol: String },

    /// A provider that requires credentials was configured without them.
    #[error("Missing credentials: {provider}")]
    MissingCredentials { provider: String },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No registered provider serves the requested capability.
    #[error("No providers available for {capability}")]
    NoProvidersAvailable { capability: Capability },

    /// Every eligible provider was tried and failed.
    #[error("All providers failed: {0}")]
    AllProvidersFailed(FailoverReport),

    /// The request-level deadline expired before any provider succeeded.
    #[error("Deadline of {budget:?} exceeded: {report}")]
    DeadlineExceeded {
        budget: Duration,
        report: FailoverReport,
    },
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use watchlist_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::RateLimited { provider: "TUSHARE".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::Authentication {
    ///     provider: "TUSHARE".to_string(),
    ///     message: "invalid token".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient errors - retry with backoff
            Self::Timeout { .. } | Self::Connection { .. } | Self::RateLimited { .. } => {
                RetryClass::WithBackoff
            }
            Self::Http { status, .. } if *status >= 500 || *status == 429 => {
                RetryClass::WithBackoff
            }

            // Provider-fatal errors - fail over, count against the circuit
            Self::Http { .. }
            | Self::Authentication { .. }
            | Self::InvalidRequest { .. }
            | Self::Parse { .. } => RetryClass::FailoverWithPenalty,

            // Provider can't serve this request - fail over, no penalty
            Self::SymbolNotSupported { .. }
            | Self::CapabilityNotSupported { .. }
            | Self::NoData { .. } => RetryClass::NextProvider,

            // Configuration and exhaustion - surfaced to the caller
            Self::MissingCredentials { .. }
            | Self::Config(_)
            | Self::NoProvidersAvailable { .. }
            | Self::AllProvidersFailed(_)
            | Self::DeadlineExceeded { .. } => RetryClass::Never,
        }
    }

    /// Whether the retry policy may re-attempt the call.
    pub fn is_transient(&self) -> bool {
        self.retry_class().is_retryable()
    }

    /// Map a reqwest transport error for `provider`.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                provider: provider.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return Self::from_status(provider, status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Self::Parse {
                provider: provider.to_string(),
                message: err.to_string(),
            };
        }
        Self::Connection {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    /// Map a non-success HTTP status for `provider`.
    pub fn from_status(provider: &str, status: u16, message: impl Into<String>) -> Self {
        let provider = provider.to_string();
        let message = message.into();
        match status {
            429 => Self::RateLimited { provider },
            401 | 403 => Self::Authentication { provider, message },
            400 | 422 => Self::InvalidRequest { provider, message },
            _ => Self::Http {
                provider,
                status,
                message,
            },
        }
    }
}
