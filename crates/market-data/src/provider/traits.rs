//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data providers must implement.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{Capability, FetchRequest, FetchResult};

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Trait for market data providers.
///
/// Implement this trait to add support for a new market data source.
/// The manager uses the provider's capabilities and priority to decide
/// when and in which order to call it.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use watchlist_market_data::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities {
///             capabilities: &[Capability::DailyBars],
///             supports_paging: false,
///         }
///     }
///
///     fn rate_limit(&self) -> RateLimit {
///         RateLimit::per_minute(30)
///     }
///
///     async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, MarketDataError> {
///         // ... call the vendor and normalize
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "TUSHARE", "EASTMONEY", etc.
    /// Used for logging, rate limiting and circuit breaker tracking.
    fn id(&self) -> &'static str;

    /// Provider priority for ordering.
    ///
    /// Lower values = higher priority. Default is 10.
    fn priority(&self) -> u8 {
        10
    }

    /// Describes what this provider can do.
    fn capabilities(&self) -> ProviderCapabilities;

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().supports(capability)
    }

    /// Rate limiting configuration.
    ///
    /// Returns the quota and anti-blocking jitter that should be applied
    /// when calling this provider.
    fn rate_limit(&self) -> RateLimit;

    /// Perform one call against the vendor.
    ///
    /// Implementations make a single attempt; retries, rate limiting and
    /// failover are applied by the caller. The payload must already be
    /// normalized to the shared schema and units.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, MarketDataError>;
}
