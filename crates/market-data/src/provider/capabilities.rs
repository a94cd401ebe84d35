//! Provider capabilities and rate limiting configuration.
//!
//! This module defines structures for describing what a market data provider
//! can do and how it should be rate-limited.

use std::time::Duration;

use crate::models::Capability;

/// Describes the capabilities of a market data provider.
///
/// Used by the manager to decide which providers are eligible for a request.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Request kinds this provider can serve.
    pub capabilities: &'static [Capability],

    /// Whether the provider honours `FetchRequest::cursor` paging.
    pub supports_paging: bool,
}

impl ProviderCapabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Inclusive range for the randomized anti-blocking delay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JitterRange {
    pub min: Duration,
    pub max: Duration,
}

impl JitterRange {
    /// Build a range from seconds, swapping the bounds if reversed and
    /// clamping negative or non-finite values to zero.
    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        let min = non_negative_secs(min);
        let max = non_negative_secs(max);
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Draw a delay uniformly from the range.
    pub fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

fn non_negative_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Rate limiting configuration for a provider.
///
/// Controls how aggressively we can call a provider to avoid
/// hitting their rate limits and getting blocked.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimit {
    /// Maximum calls admitted in any rolling 60-second window.
    /// `None` means the vendor documents no quota.
    pub requests_per_minute: Option<u32>,

    /// Randomized delay applied before every call, for vendors that block
    /// callers with a fixed request rhythm.
    pub jitter: Option<JitterRange>,
}

impl RateLimit {
    pub fn unlimited() -> Self {
        Self {
            requests_per_minute: None,
            jitter: None,
        }
    }

    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute: Some(requests_per_minute),
            jitter: None,
        }
    }

    pub fn with_jitter(mut self, jitter: JitterRange) -> Self {
        self.jitter = Some(jitter);
        self
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_jitter_samples_within_bounds() {
        let range = JitterRange::from_secs_f64(2.0, 5.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let delay = range.sample(&mut rng);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_jitter_reversed_and_degenerate_ranges() {
        let range = JitterRange::from_secs_f64(5.0, 2.0);
        assert_eq!(range.min, Duration::from_secs(2));
        assert_eq!(range.max, Duration::from_secs(5));

        let fixed = JitterRange::from_secs_f64(1.5, 1.5);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(fixed.sample(&mut rng), Duration::from_millis(1500));
    }

    #[test]
    fn test_capabilities_supports() {
        let caps = ProviderCapabilities {
            capabilities: &[Capability::DailyBars],
            supports_paging: false,
        };
        assert!(caps.supports(Capability::DailyBars));
        assert!(!caps.supports(Capability::BasicInfo));
    }
}
