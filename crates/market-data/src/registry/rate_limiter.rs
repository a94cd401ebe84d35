//! Sliding-window rate limiter for market data providers.
//!
//! Each provider gets a [`QuotaWindow`] counting calls in the last 60 seconds
//! against its ceiling, plus an optional randomized delay ("jitter") applied
//! before every call. Per-provider state is created lazily on first use and
//! lives for the life of the limiter.
//!
//! Slot acquisition for a single provider is serialized: the window lock is
//! held across the quota wait, the jitter delay and the timestamp record, so
//! two concurrent callers can never both claim the last free slot. Different
//! providers never wait on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use super::circuit_breaker::{Admission, Circuit, CircuitBreakerConfig, CircuitState, Rejection};
use super::diagnostics::SkipReason;
use crate::models::ProviderId;
use crate::provider::RateLimit;

/// Length of the rolling quota window.
pub const QUOTA_WINDOW: Duration = Duration::from_secs(60);

/// Rolling window of call timestamps for one provider.
#[derive(Debug)]
pub struct QuotaWindow {
    calls: VecDeque<Instant>,
    ceiling: Option<u32>,
    span: Duration,
}

impl QuotaWindow {
    /// A window admitting at most `ceiling` calls per [`QUOTA_WINDOW`].
    pub fn new(ceiling: Option<u32>) -> Self {
        Self::with_span(ceiling, QUOTA_WINDOW)
    }

    pub fn with_span(ceiling: Option<u32>, span: Duration) -> Self {
        Self {
            calls: VecDeque::new(),
            ceiling: ceiling.map(|c| c.max(1)),
            span,
        }
    }

    /// Drop calls that have aged out of the window at `now`.
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= self.span {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long until a slot is free at `now`; zero if one is free already.
    pub fn time_until_available(&mut self, now: Instant) -> Duration {
        self.prune(now);

        let Some(ceiling) = self.ceiling else {
            return Duration::ZERO;
        };
        if (self.calls.len() as u32) < ceiling {
            return Duration::ZERO;
        }

        self.calls
            .front()
            .map(|&oldest| (oldest + self.span).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Record a call made at `now`.
    pub fn record(&mut self, now: Instant) {
        self.prune(now);
        self.calls.push_back(now);
    }

    /// Record the call if a slot is free, otherwise return the wait.
    pub fn try_admit(&mut self, now: Instant) -> Result<(), Duration> {
        match self.time_until_available(now) {
            wait if wait.is_zero() => {
                self.record(now);
                Ok(())
            }
            wait => Err(wait),
        }
    }

    /// Calls counted in the window at `now`.
    pub fn len_at(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.calls.len()
    }

    pub fn ceiling(&self) -> Option<u32> {
        self.ceiling
    }
}

/// Mutable per-provider state shared by every request in the process.
#[derive(Debug)]
struct ProviderState {
    limit: RateLimit,
    /// Held across the whole acquire sequence.
    window: tokio::sync::Mutex<QuotaWindow>,
    /// Short critical sections only; never held across an await.
    circuit: Mutex<Circuit>,
}

impl ProviderState {
    fn new(limit: RateLimit) -> Self {
        Self {
            window: tokio::sync::Mutex::new(QuotaWindow::new(limit.requests_per_minute)),
            circuit: Mutex::new(Circuit::default()),
            limit,
        }
    }

    fn lock_circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit state mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Admission through a provider's circuit, held for the duration of the call.
///
/// When the circuit was half-open this is the single trial slot, released on
/// drop if no success or failure was recorded first.
#[must_use]
pub struct CircuitPermit {
    trial: Option<Arc<ProviderState>>,
}

impl CircuitPermit {
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if let Some(state) = self.trial.take() {
            state.lock_circuit().end_trial();
        }
    }
}

/// Rate limiter for multiple providers.
///
/// Thread-safe limiter that maintains per-provider quota windows and circuit
/// state. Providers without an explicit configuration get
/// [`RateLimit::default`].
pub struct RateLimiter {
    /// Per-provider state, created on first use.
    states: Mutex<HashMap<String, Arc<ProviderState>>>,
    /// Per-provider configuration overrides.
    configs: Mutex<HashMap<String, RateLimit>>,
    circuit_config: CircuitBreakerConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with default circuit breaking.
    pub fn new() -> Self {
        Self::with_circuit_config(CircuitBreakerConfig::default())
    }

    pub fn with_circuit_config(circuit_config: CircuitBreakerConfig) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
            circuit_config,
        }
    }

    /// Lock the states mutex, recovering from poison if necessary.
    ///
    /// The worst case after recovery is a slightly stale window, which is
    /// better than panicking.
    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, Arc<ProviderState>>> {
        self.states.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter states mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimit>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure limits for a specific provider.
    ///
    /// Resets any existing state for the provider.
    pub fn configure(&self, provider: &ProviderId, limit: RateLimit) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), limit);
        drop(configs); // Release configs lock before acquiring states lock

        let mut states = self.lock_states();
        states.remove(provider.as_ref());
    }

    /// Configured limit for a provider.
    pub fn limit(&self, provider: &ProviderId) -> RateLimit {
        self.lock_configs()
            .get(provider.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    fn state(&self, provider: &ProviderId) -> Arc<ProviderState> {
        if let Some(state) = self.lock_states().get(provider.as_ref()) {
            return Arc::clone(state);
        }

        let limit = self.limit(provider);
        let mut states = self.lock_states();
        Arc::clone(
            states
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(ProviderState::new(limit))),
        )
    }

    /// Wait until the provider may be called, then claim the slot.
    ///
    /// Never fails, only delays. Waits for a free quota slot (recomputing at
    /// each wake-up), then sleeps the provider's jitter, then records the
    /// call timestamp immediately before returning.
    pub async fn acquire(&self, provider: &ProviderId) {
        let state = self.state(provider);
        let mut window = state.window.lock().await;

        loop {
            let wait = window.time_until_available(Instant::now());
            if wait.is_zero() {
                break;
            }
            debug!(
                "Rate limiter: quota full for '{}' ({:?}/min), waiting {:?}",
                provider, state.limit.requests_per_minute, wait
            );
            tokio::time::sleep(wait).await;
        }

        if let Some(jitter) = state.limit.jitter {
            let delay = jitter.sample(&mut rand::thread_rng());
            debug!(
                "Rate limiter: anti-blocking delay {:?} for '{}'",
                delay, provider
            );
            tokio::time::sleep(delay).await;
        }

        window.record(Instant::now());
        debug!("Rate limiter: acquired slot for '{}'", provider);
    }

    /// Try to claim a slot without waiting. Jitter is not applied.
    pub fn try_acquire(&self, provider: &ProviderId) -> bool {
        let state = self.state(provider);
        let Ok(mut window) = state.window.try_lock() else {
            return false;
        };
        window.try_admit(Instant::now()).is_ok()
    }

    /// Calls counted in the provider's current window.
    ///
    /// Waits for any in-progress acquire on the same provider.
    pub async fn calls_in_window(&self, provider: &ProviderId) -> usize {
        let state = self.state(provider);
        let mut window = state.window.lock().await;
        window.len_at(Instant::now())
    }

    /// Current circuit state for a provider.
    pub fn circuit_state(&self, provider: &ProviderId) -> CircuitState {
        self.state(provider).lock_circuit().state(Instant::now())
    }

    /// Remaining cool-down if the provider's circuit is open.
    pub fn circuit_open_remaining(&self, provider: &ProviderId) -> Option<Duration> {
        self.state(provider)
            .lock_circuit()
            .open_remaining(Instant::now())
    }

    /// Check the provider's circuit before calling it.
    ///
    /// Closed circuits always admit. An open circuit rejects with the
    /// remaining cool-down. A half-open circuit admits one caller at a time.
    pub fn admit(&self, provider: &ProviderId) -> Result<CircuitPermit, SkipReason> {
        let state = self.state(provider);
        let admission = state.lock_circuit().admit(Instant::now());
        match admission {
            Ok(Admission::Closed) => Ok(CircuitPermit { trial: None }),
            Ok(Admission::Trial) => {
                debug!("Circuit breaker: trial call admitted for '{}'", provider);
                Ok(CircuitPermit { trial: Some(state) })
            }
            Err(Rejection::Open { remaining }) => Err(SkipReason::CircuitOpen { remaining }),
            Err(Rejection::TrialInFlight) => Err(SkipReason::TrialInFlight),
        }
    }

    pub fn is_circuit_open(&self, provider: &ProviderId) -> bool {
        self.circuit_open_remaining(provider).is_some()
    }

    pub fn consecutive_failures(&self, provider: &ProviderId) -> u32 {
        self.state(provider).lock_circuit().consecutive_failures()
    }

    /// Record a successful provider call.
    pub fn record_success(&self, provider: &ProviderId) {
        let state = self.state(provider);
        let mut circuit = state.lock_circuit();
        if circuit.consecutive_failures() > 0 {
            debug!(
                "Circuit breaker: success for '{}', failure count reset",
                provider
            );
        }
        circuit.record_success();
    }

    /// Record a terminal provider failure; may open the circuit.
    pub fn record_failure(&self, provider: &ProviderId) {
        let state = self.state(provider);
        let mut circuit = state.lock_circuit();
        if circuit.record_failure(Instant::now(), &self.circuit_config) {
            warn!(
                "Circuit breaker: opening circuit for '{}' after {} consecutive failures (cool-down {:?})",
                provider,
                circuit.consecutive_failures(),
                self.circuit_config.cooldown
            );
        } else {
            debug!(
                "Circuit breaker: failure for '{}' ({} consecutive)",
                provider,
                circuit.consecutive_failures()
            );
        }
    }

    /// Reset window and circuit for a provider.
    pub fn reset(&self, provider: &ProviderId) {
        let mut states = self.lock_states();
        states.remove(provider.as_ref());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
