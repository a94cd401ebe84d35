//! Fetcher manager: provider ordering, retries and failover.
//!
//! For every request the manager:
//! 1. Orders the providers that support the capability (priority, then
//!    registration order)
//! 2. Skips providers whose circuit is open, without consuming quota
//! 3. Runs the provider's [`RetryPolicy`]; each attempt first acquires a
//!    rate-limit slot, then calls the provider
//! 4. Returns the first success, or a [`FailoverReport`] of every failure
//!
//! Batches run through a bounded worker pool; each request still walks its
//! providers sequentially.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio::time::Instant;

use super::circuit_breaker::CircuitBreakerConfig;
use super::diagnostics::{FetchDiagnostics, SkipReason};
use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use crate::config::MarketDataConfig;
use crate::errors::MarketDataError;
use crate::models::{
    Capability, DailyBar, DateRange, FetchRequest, FetchResult, ProviderId, RealtimeQuote,
    StockBasicInfo,
};
use crate::provider::{MarketDataProvider, ProviderKind};

/// Default number of requests served concurrently by [`FetcherManager::fetch_batch`].
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// Manager-wide settings.
#[derive(Clone, Debug)]
pub struct ManagerSettings {
    /// Worker pool size for batches. Zero is treated as one.
    pub max_workers: usize,
    /// Budget for one request across all providers.
    pub deadline: Option<Duration>,
    /// Retry policy for providers without an override.
    pub retry: RetryPolicy,
    pub circuit: CircuitBreakerConfig,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            deadline: None,
            retry: RetryPolicy::default(),
            circuit: CircuitBreakerConfig::default(),
        }
    }
}

/// Outcome of walking a single provider.
enum ProviderOutcome {
    Success(FetchResult),
    Failed,
    DeadlineHit,
}

/// Orchestrates fetching across registered providers.
pub struct FetcherManager {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    retry_policies: HashMap<&'static str, RetryPolicy>,
    rate_limiter: RateLimiter,
    settings: ManagerSettings,
}

impl FetcherManager {
    /// Create a manager with default settings.
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        Self::with_settings(providers, ManagerSettings::default())
    }

    /// Create a manager with custom settings.
    ///
    /// Each provider's declared [`RateLimit`](crate::provider::RateLimit) is
    /// installed in the rate limiter.
    pub fn with_settings(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        settings: ManagerSettings,
    ) -> Self {
        let rate_limiter = RateLimiter::with_circuit_config(settings.circuit.clone());
        for provider in &providers {
            rate_limiter.configure(&Cow::Borrowed(provider.id()), provider.rate_limit());
        }

        Self {
            providers,
            retry_policies: HashMap::new(),
            rate_limiter,
            settings,
        }
    }

    /// Build every enabled provider from configuration.
    ///
    /// Providers that are disabled or lack credentials are not registered.
    pub fn from_config(config: &MarketDataConfig) -> Result<Self, MarketDataError> {
        let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();
        let mut retry_policies = HashMap::new();

        for kind in ProviderKind::ALL {
            match kind.build(config)? {
                Some(provider) => {
                    info!(
                        "Registered provider '{}' (priority {})",
                        provider.id(),
                        provider.priority()
                    );
                    retry_policies.insert(provider.id(), config.retry_policy_for(kind));
                    providers.push(provider);
                }
                None => info!("Provider '{}' not registered", kind),
            }
        }

        let settings = ManagerSettings {
            max_workers: config.max_workers,
            deadline: config.fetch_deadline,
            retry: config.default_retry_policy(),
            circuit: config.circuit_breaker(),
        };

        let mut manager = Self::with_settings(providers, settings);
        manager.retry_policies = retry_policies;
        Ok(manager)
    }

    /// Override the retry policy for one provider.
    pub fn with_retry_policy(mut self, provider: &'static str, policy: RetryPolicy) -> Self {
        self.retry_policies.insert(provider, policy);
        self
    }

    pub fn retry_policy(&self, provider: &str) -> &RetryPolicy {
        self.retry_policies
            .get(provider)
            .unwrap_or(&self.settings.retry)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Registered provider ids in registration order.
    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Providers supporting `capability`, in the order they will be tried.
    ///
    /// Sorted by priority; the sort is stable so ties keep registration order.
    pub fn providers_for(&self, capability: Capability) -> Vec<Arc<dyn MarketDataProvider>> {
        let mut providers: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.supports(capability))
            .cloned()
            .collect();
        providers.sort_by_key(|p| p.priority());
        providers
    }

    /// Providers able to serve `request`. A paging cursor is only honoured by
    /// providers that declare `supports_paging`.
    fn providers_for_request(&self, request: &FetchRequest) -> Vec<Arc<dyn MarketDataProvider>> {
        let mut providers = self.providers_for(request.capability());
        if request.cursor().is_some() {
            providers.retain(|p| p.capabilities().supports_paging);
        }
        providers
    }

    /// Fetch one request, failing over between providers.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, MarketDataError> {
        let capability = request.capability();
        let providers = self.providers_for_request(request);

        if providers.is_empty() {
            match request.cursor() {
                Some(cursor) => warn!("No paging providers for {} (cursor {})", capability, cursor),
                None => warn!("No providers available for {}", capability),
            }
            return Err(MarketDataError::NoProvidersAvailable { capability });
        }

        let deadline = self.settings.deadline.map(|budget| (budget, Instant::now() + budget));
        let mut diagnostics = FetchDiagnostics::new(capability, request.symbol());

        for (index, provider) in providers.iter().enumerate() {
            let provider_id: ProviderId = Cow::Borrowed(provider.id());

            if let Some((budget, at)) = deadline {
                if Instant::now() >= at {
                    return Err(self.abandon(diagnostics, &providers[index..], budget));
                }
            }

            let _permit = match self.rate_limiter.admit(&provider_id) {
                Ok(permit) => permit,
                Err(reason) => {
                    debug!("Skipping provider '{}': {}", provider_id, reason);
                    diagnostics.record_skip(provider_id, reason);
                    continue;
                }
            };

            match self
                .try_provider(provider, request, deadline.map(|(_, at)| at), &mut diagnostics)
                .await
            {
                ProviderOutcome::Success(result) => {
                    debug!("Fetch diagnostics: {}", diagnostics.summary());
                    return Ok(result);
                }
                ProviderOutcome::Failed => continue,
                ProviderOutcome::DeadlineHit => {
                    let budget = deadline.map(|(budget, _)| budget).unwrap_or_default();
                    return Err(self.abandon(diagnostics, &providers[index + 1..], budget));
                }
            }
        }

        let report = diagnostics.into_report();
        warn!("All providers failed: {}", report);
        Err(MarketDataError::AllProvidersFailed(report))
    }

    async fn try_provider(
        &self,
        provider: &Arc<dyn MarketDataProvider>,
        request: &FetchRequest,
        deadline: Option<Instant>,
        diagnostics: &mut FetchDiagnostics,
    ) -> ProviderOutcome {
        let provider_id: ProviderId = Cow::Borrowed(provider.id());
        let policy = self.retry_policy(provider.id());
        let attempts = AtomicU32::new(0);

        info!(
            "Fetching {} for {} from provider '{}'",
            request.capability(),
            request.symbol(),
            provider_id
        );

        // Quota waits happen in the gate so the per-call timeout only covers the call.
        let walk = policy.execute_gated(
            provider.id(),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                self.rate_limiter.acquire(&provider_id).await;
            },
            || async {
                match provider.fetch(request).await {
                    Ok(result) if result.payload.capability() != request.capability() => {
                        Err(MarketDataError::Parse {
                            provider: provider.id().to_string(),
                            message: format!(
                                "expected {} payload, got {}",
                                request.capability(),
                                result.payload.capability()
                            ),
                        })
                    }
                    other => other,
                }
            },
        );

        let outcome = match deadline {
            Some(at) => match tokio::time::timeout_at(at, walk).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        "Request deadline hit while calling provider '{}'",
                        provider_id
                    );
                    diagnostics.record_failure(
                        provider_id.clone(),
                        attempts.load(Ordering::SeqCst),
                        MarketDataError::Timeout {
                            provider: provider_id.to_string(),
                        },
                    );
                    return ProviderOutcome::DeadlineHit;
                }
            },
            None => walk.await,
        };

        match outcome {
            Ok((result, attempts)) => {
                self.rate_limiter.record_success(&provider_id);
                info!(
                    "Fetched {} for {} from '{}' after {} attempt(s)",
                    request.capability(),
                    request.symbol(),
                    provider_id,
                    attempts
                );
                diagnostics.record_success(provider_id, attempts);
                ProviderOutcome::Success(result)
            }
            Err(exhausted) => {
                if exhausted.error.retry_class().penalizes_provider() {
                    self.rate_limiter.record_failure(&provider_id);
                }
                warn!(
                    "Provider '{}' failed after {} attempt(s): {}, trying next provider",
                    provider_id, exhausted.attempts, exhausted.error
                );
                diagnostics.record_failure(provider_id, exhausted.attempts, exhausted.error);
                ProviderOutcome::Failed
            }
        }
    }

    fn abandon(
        &self,
        mut diagnostics: FetchDiagnostics,
        remaining: &[Arc<dyn MarketDataProvider>],
        budget: Duration,
    ) -> MarketDataError {
        for provider in remaining {
            diagnostics.record_skip(Cow::Borrowed(provider.id()), SkipReason::DeadlineExceeded);
        }
        let report = diagnostics.into_report();
        warn!("Request deadline of {:?} exceeded: {}", budget, report);
        MarketDataError::DeadlineExceeded { budget, report }
    }

    /// Fetch many requests through a bounded worker pool.
    ///
    /// At most `max_workers` requests are in flight; results come back in
    /// input order.
    pub async fn fetch_batch(
        &self,
        requests: Vec<FetchRequest>,
    ) -> Vec<Result<FetchResult, MarketDataError>> {
        let workers = self.settings.max_workers.max(1);
        debug!(
            "Fetching batch of {} request(s) with {} worker(s)",
            requests.len(),
            workers
        );

        stream::iter(requests)
            .map(|request| async move { self.fetch(&request).await })
            .buffered(workers)
            .collect()
            .await
    }

    /// Daily bars for `symbol`, optionally restricted to `range`.
    pub async fn fetch_daily_bars(
        &self,
        symbol: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        let mut request = FetchRequest::new(Capability::DailyBars, symbol);
        if let Some(range) = range {
            request = request.with_range(range);
        }
        let result = self.fetch(&request).await?;
        let provider = result.provider.to_string();
        result
            .into_daily_bars()
            .ok_or_else(|| unexpected_payload(provider, Capability::DailyBars))
    }

    pub async fn fetch_basic_info(&self, symbol: &str) -> Result<StockBasicInfo, MarketDataError> {
        let result = self.fetch(&FetchRequest::basic_info(symbol)).await?;
        let provider = result.provider.to_string();
        result
            .into_basic_info()
            .ok_or_else(|| unexpected_payload(provider, Capability::BasicInfo))
    }

    pub async fn fetch_realtime_quote(
        &self,
        symbol: &str,
    ) -> Result<RealtimeQuote, MarketDataError> {
        let result = self.fetch(&FetchRequest::realtime_quote(symbol)).await?;
        let provider = result.provider.to_string();
        result
            .into_realtime_quote()
            .ok_or_else(|| unexpected_payload(provider, Capability::RealtimeQuote))
    }
}

fn unexpected_payload(provider: String, capability: Capability) -> MarketDataError {
    MarketDataError::Parse {
        provider,
        message: format!("expected {} payload", capability),
    }
}
