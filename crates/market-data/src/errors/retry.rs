/// Classification for retry policy.
///
/// Used to determine how the retry policy and the fetcher manager respond to
/// errors from providers.
///
/// # Behavior Summary
///
/// | Class | Retried in place? | Try Next Provider? | Circuit penalty? |
/// |-------|-------------------|--------------------|------------------|
/// | `WithBackoff` | Yes, until `max_retries` | Yes, once exhausted | Yes |
/// | `FailoverWithPenalty` | No | Yes | Yes |
/// | `NextProvider` | No | Yes | No |
/// | `Never` | No | Yes | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient failure: timeout, connection error, HTTP 5xx or a vendor
    /// rate-limit rejection. Retried with exponential backoff, then escalated
    /// to failover.
    WithBackoff,

    /// Provider-fatal failure: bad credentials, malformed request, HTTP 4xx.
    /// Retrying the same provider cannot help; fail over immediately and count
    /// the failure against the provider's circuit.
    FailoverWithPenalty,

    /// The provider cannot serve this particular request (unknown symbol, no
    /// data in range) but is otherwise healthy. Fail over without penalty.
    NextProvider,

    /// Not a provider failure (missing credentials, configuration). Never
    /// retried; a provider raising it is passed over without penalty.
    Never,
}

impl RetryClass {
    /// Whether the retry policy may re-attempt the same provider.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::WithBackoff)
    }

    /// Whether the failure counts against the provider's circuit breaker.
    pub fn penalizes_provider(self) -> bool {
        matches!(self, Self::WithBackoff | Self::FailoverWithPenalty)
    }
}
