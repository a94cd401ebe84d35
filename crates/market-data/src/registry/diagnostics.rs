//! Failover diagnostics: what happened to each provider during one fetch.

use std::fmt;
use std::time::Duration;

use crate::errors::MarketDataError;
use crate::models::{Capability, ProviderId};

/// Why a provider was skipped during a fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Circuit breaker is open for this provider.
    CircuitOpen { remaining: Duration },

    /// Circuit is half-open and another request holds its trial call.
    TrialInFlight,

    /// The request deadline expired before this provider was reached.
    DeadlineExceeded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { remaining } => {
                write!(f, "circuit open, {}s remaining", remaining.as_secs())
            }
            Self::TrialInFlight => write!(f, "circuit half-open, trial call in flight"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Terminal failure of one provider after its retry budget.
#[derive(Clone, Debug)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub attempts: u32,
    pub error: MarketDataError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt{}: {}",
            self.provider,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.error
        )
    }
}

/// Aggregated outcome of a failed provider walk.
///
/// `failures` is in attempt order; `skipped` lists providers that were never
/// called.
#[derive(Clone, Debug)]
pub struct FailoverReport {
    pub capability: Capability,
    pub symbol: String,
    pub failures: Vec<ProviderFailure>,
    pub skipped: Vec<(ProviderId, SkipReason)>,
}

impl FailoverReport {
    pub fn new(capability: Capability, symbol: impl Into<String>) -> Self {
        Self {
            capability,
            symbol: symbol.into(),
            failures: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Providers that were actually called, in order.
    pub fn attempted_providers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.provider.as_ref()).collect()
    }

    pub fn failure_for(&self, provider: &str) -> Option<&ProviderFailure> {
        self.failures.iter().find(|f| f.provider == provider)
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

impl fmt::Display for FailoverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}", self.capability, self.symbol)?;
        if self.is_empty() {
            return write!(f, " (no provider attempted)");
        }

        let mut parts: Vec<String> = self.failures.iter().map(|x| x.to_string()).collect();
        parts.extend(
            self.skipped
                .iter()
                .map(|(provider, reason)| format!("{} skipped ({})", provider, reason)),
        );
        write!(f, " [{}]", parts.join("; "))
    }
}

/// Step-by-step trace of a provider walk, logged once per request.
#[derive(Clone, Debug)]
pub struct FetchDiagnostics {
    report: FailoverReport,
    succeeded: Option<(ProviderId, u32)>,
}

impl FetchDiagnostics {
    pub fn new(capability: Capability, symbol: impl Into<String>) -> Self {
        Self {
            report: FailoverReport::new(capability, symbol),
            succeeded: None,
        }
    }

    pub fn record_skip(&mut self, provider: ProviderId, reason: SkipReason) {
        self.report.skipped.push((provider, reason));
    }

    pub fn record_failure(&mut self, provider: ProviderId, attempts: u32, error: MarketDataError) {
        self.report.failures.push(ProviderFailure {
            provider,
            attempts,
            error,
        });
    }

    pub fn record_success(&mut self, provider: ProviderId, attempts: u32) {
        self.succeeded = Some((provider, attempts));
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        let mut steps: Vec<String> = self
            .report
            .failures
            .iter()
            .map(|f| format!("{}: ERROR x{} ({})", f.provider, f.attempts, f.error))
            .collect();
        steps.extend(
            self.report
                .skipped
                .iter()
                .map(|(provider, reason)| format!("{}: SKIPPED ({})", provider, reason)),
        );
        if let Some((provider, attempts)) = &self.succeeded {
            steps.push(format!("{}: SUCCESS x{}", provider, attempts));
        }
        if steps.is_empty() {
            return "no providers".to_string();
        }
        steps.join(" -> ")
    }

    pub fn into_report(self) -> FailoverReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn timeout(provider: &str) -> MarketDataError {
        MarketDataError::Timeout {
            provider: provider.to_string(),
        }
    }

    #[test]
    fn test_report_display_lists_failures_then_skips() {
        let mut diagnostics = FetchDiagnostics::new(Capability::DailyBars, "600519");
        diagnostics.record_failure(Cow::Borrowed("EASTMONEY"), 3, timeout("EASTMONEY"));
        diagnostics.record_skip(
            Cow::Borrowed("YAHOO"),
            SkipReason::CircuitOpen {
                remaining: Duration::from_secs(42),
            },
        );

        let report = diagnostics.into_report();
        assert_eq!(
            report.to_string(),
            "daily_bars for 600519 [EASTMONEY failed after 3 attempts: Timeout: EASTMONEY; \
             YAHOO skipped (circuit open, 42s remaining)]"
        );
    }

    #[test]
    fn test_attempted_providers_keep_order() {
        let mut report = FailoverReport::new(Capability::BasicInfo, "000001");
        for provider in ["A", "B", "C"] {
            report.failures.push(ProviderFailure {
                provider: Cow::Owned(provider.to_string()),
                attempts: 1,
                error: timeout(provider),
            });
        }
        assert_eq!(report.attempted_providers(), vec!["A", "B", "C"]);
        assert_eq!(report.failure_for("B").map(|f| f.attempts), Some(1));
        assert!(report.failure_for("D").is_none());
    }

    #[test]
    fn test_summary() {
        let mut diagnostics = FetchDiagnostics::new(Capability::RealtimeQuote, "300750");
        assert_eq!(diagnostics.summary(), "no providers");

        diagnostics.record_failure(Cow::Borrowed("TUSHARE"), 1, timeout("TUSHARE"));
        diagnostics.record_success(Cow::Borrowed("EASTMONEY"), 2);
        assert_eq!(
            diagnostics.summary(),
            "TUSHARE: ERROR x1 (Timeout: TUSHARE) -> EASTMONEY: SUCCESS x2"
        );
    }
}
