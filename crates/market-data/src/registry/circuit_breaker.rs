//! Per-provider circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to stop hammering a provider that
//! keeps failing. The circuit has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Provider is failing, requests are skipped until the cool-down
//!   elapses.
//! - **HalfOpen**: Cool-down elapsed; exactly one request is admitted as a
//!   trial call while others keep skipping. A success closes the circuit, a
//!   failure reopens it.
//!
//! Circuit state lives inside each provider's [`ProviderState`](super::rate_limiter)
//! and is in-memory only.

use std::time::Duration;

use tokio::time::Instant;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to keep the circuit open.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Provider is failing - requests are skipped.
    Open,
    /// Cool-down elapsed - one trial request is let through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive terminal failures before opening the circuit.
    /// `None` disables circuit breaking.
    pub failure_threshold: Option<u32>,
    /// How long the circuit stays open before a trial call is allowed.
    pub cooldown: Duration,
}

impl CircuitBreakerConfig {
    pub fn disabled() -> Self {
        Self {
            failure_threshold: None,
            ..Self::default()
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Some(DEFAULT_FAILURE_THRESHOLD),
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// How a request got past the circuit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Admission {
    Closed,
    /// The single half-open trial; must be ended with [`Circuit::end_trial`].
    Trial,
}

/// Why a request was not admitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Rejection {
    Open { remaining: Duration },
    TrialInFlight,
}

/// Circuit bookkeeping for a single provider.
#[derive(Debug, Default)]
pub(crate) struct Circuit {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

impl Circuit {
    pub(crate) fn state(&self, now: Instant) -> CircuitState {
        match self.open_until {
            None => CircuitState::Closed,
            Some(until) if now < until => CircuitState::Open,
            Some(_) => CircuitState::HalfOpen,
        }
    }

    /// Remaining cool-down if the circuit is open at `now`.
    pub(crate) fn open_remaining(&self, now: Instant) -> Option<Duration> {
        self.open_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Decide whether a request may call the provider at `now`.
    pub(crate) fn admit(&mut self, now: Instant) -> Result<Admission, Rejection> {
        match self.state(now) {
            CircuitState::Closed => Ok(Admission::Closed),
            CircuitState::Open => Err(Rejection::Open {
                remaining: self.open_remaining(now).unwrap_or_default(),
            }),
            CircuitState::HalfOpen if self.trial_in_flight => Err(Rejection::TrialInFlight),
            CircuitState::HalfOpen => {
                self.trial_in_flight = true;
                Ok(Admission::Trial)
            }
        }
    }

    /// Release the trial slot without recording an outcome.
    pub(crate) fn end_trial(&mut self) {
        self.trial_in_flight = false;
    }

    /// A success closes the circuit and clears the failure streak.
    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
        self.trial_in_flight = false;
    }

    /// Count a terminal failure. Returns `true` if this failure (re)opened the circuit.
    pub(crate) fn record_failure(&mut self, now: Instant, config: &CircuitBreakerConfig) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.trial_in_flight = false;

        let Some(threshold) = config.failure_threshold else {
            return false;
        };

        let half_open = self.state(now) == CircuitState::HalfOpen;
        if half_open || self.consecutive_failures >= threshold.max(1) {
            self.open_until = Some(now + config.cooldown);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, cooldown_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: Some(threshold),
            cooldown: Duration::from_secs(cooldown_secs),
        }
    }

    #[test]
    fn test_circuit_starts_closed() {
        let circuit = Circuit::default();
        assert_eq!(circuit.state(Instant::now()), CircuitState::Closed);
        assert!(circuit.open_remaining(Instant::now()).is_none());
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let cfg = config(3, 60);
        let mut circuit = Circuit::default();
        let now = Instant::now();

        assert!(!circuit.record_failure(now, &cfg));
        assert!(!circuit.record_failure(now, &cfg));
        assert_eq!(circuit.state(now), CircuitState::Closed);

        assert!(circuit.record_failure(now, &cfg));
        assert_eq!(circuit.state(now), CircuitState::Open);
        assert_eq!(circuit.open_remaining(now), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cfg = config(3, 60);
        let mut circuit = Circuit::default();
        let now = Instant::now();

        circuit.record_failure(now, &cfg);
        circuit.record_failure(now, &cfg);
        assert_eq!(circuit.consecutive_failures(), 2);

        circuit.record_success();
        assert_eq!(circuit.consecutive_failures(), 0);
    }

    #[test]
    fn test_circuit_half_opens_after_cooldown() {
        let cfg = config(1, 10);
        let mut circuit = Circuit::default();
        let now = Instant::now();

        circuit.record_failure(now, &cfg);
        assert_eq!(circuit.state(now + Duration::from_secs(9)), CircuitState::Open);
        assert_eq!(
            circuit.state(now + Duration::from_secs(10)),
            CircuitState::HalfOpen
        );
    }

    #[test]
    fn test_half_open_trial_failure_reopens() {
        let cfg = config(3, 10);
        let mut circuit = Circuit::default();
        let start = Instant::now();

        for _ in 0..3 {
            circuit.record_failure(start, &cfg);
        }
        let trial_at = start + Duration::from_secs(11);
        assert_eq!(circuit.state(trial_at), CircuitState::HalfOpen);

        assert!(circuit.record_failure(trial_at, &cfg));
        assert_eq!(circuit.state(trial_at), CircuitState::Open);
        assert_eq!(
            circuit.open_remaining(trial_at),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let cfg = config(1, 10);
        let mut circuit = Circuit::default();
        let start = Instant::now();
        circuit.record_failure(start, &cfg);

        assert_eq!(
            circuit.admit(start + Duration::from_secs(4)),
            Err(Rejection::Open {
                remaining: Duration::from_secs(6)
            })
        );

        let later = start + Duration::from_secs(10);
        assert_eq!(circuit.admit(later), Ok(Admission::Trial));
        assert_eq!(circuit.admit(later), Err(Rejection::TrialInFlight));

        // An abandoned trial frees the slot for the next caller.
        circuit.end_trial();
        assert_eq!(circuit.admit(later), Ok(Admission::Trial));

        circuit.record_success();
        assert_eq!(circuit.admit(later), Ok(Admission::Closed));
        assert_eq!(circuit.admit(later), Ok(Admission::Closed));
    }

    #[test]
    fn test_failed_trial_reopens_and_clears_slot() {
        let cfg = config(1, 10);
        let mut circuit = Circuit::default();
        let start = Instant::now();
        circuit.record_failure(start, &cfg);

        let trial_at = start + Duration::from_secs(10);
        assert_eq!(circuit.admit(trial_at), Ok(Admission::Trial));
        assert!(circuit.record_failure(trial_at, &cfg));

        let next = trial_at + Duration::from_secs(10);
        assert_eq!(circuit.admit(next), Ok(Admission::Trial));
    }

    #[test]
    fn test_half_open_trial_success_closes() {
        let cfg = config(1, 10);
        let mut circuit = Circuit::default();
        let start = Instant::now();

        circuit.record_failure(start, &cfg);
        circuit.record_success();
        assert_eq!(
            circuit.state(start + Duration::from_secs(1)),
            CircuitState::Closed
        );
    }

    #[test]
    fn test_disabled_circuit_never_opens() {
        let cfg = CircuitBreakerConfig::disabled();
        let mut circuit = Circuit::default();
        let now = Instant::now();

        for _ in 0..100 {
            assert!(!circuit.record_failure(now, &cfg));
        }
        assert_eq!(circuit.state(now), CircuitState::Closed);
        assert_eq!(circuit.consecutive_failures(), 100);
    }
}
