//! The closed set of adapters and the factory that builds them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{info, warn};

use super::eastmoney::EastmoneyProvider;
use super::tushare::TushareProvider;
use super::yahoo::YahooProvider;
use super::MarketDataProvider;
use crate::config::MarketDataConfig;
use crate::errors::MarketDataError;

/// Every adapter this crate knows how to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Eastmoney,
    Tushare,
    Yahoo,
}

impl ProviderKind {
    /// Registration order.
    pub const ALL: [ProviderKind; 3] = [Self::Eastmoney, Self::Tushare, Self::Yahoo];

    /// Provider id used in logs, diagnostics and the rate limiter.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Eastmoney => super::eastmoney::PROVIDER_ID,
            Self::Tushare => super::tushare::PROVIDER_ID,
            Self::Yahoo => super::yahoo::PROVIDER_ID,
        }
    }

    /// Prefix of this provider's environment overrides.
    pub fn env_prefix(&self) -> &'static str {
        self.id()
    }

    /// Build the adapter, or `Ok(None)` if it is disabled or lacks
    /// credentials.
    pub fn build(
        &self,
        config: &MarketDataConfig,
    ) -> Result<Option<Arc<dyn MarketDataProvider>>, MarketDataError> {
        let settings = config.settings_for(*self);
        if !settings.enabled {
            info!("Provider '{}' disabled by configuration", self);
            return Ok(None);
        }

        let provider: Arc<dyn MarketDataProvider> = match self {
            Self::Eastmoney => Arc::new(EastmoneyProvider::new(settings)),
            Self::Tushare => match config.tushare_token.as_deref() {
                Some(token) => Arc::new(TushareProvider::new(token.to_string(), settings)),
                None => {
                    warn!("Provider '{}' skipped: TUSHARE_TOKEN not set", self);
                    return Ok(None);
                }
            },
            Self::Yahoo => Arc::new(YahooProvider::new(settings)),
        };
        Ok(Some(provider))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProviderKind {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eastmoney" | "akshare" => Ok(Self::Eastmoney),
            "tushare" => Ok(Self::Tushare),
            "yahoo" | "yfinance" => Ok(Self::Yahoo),
            other => Err(MarketDataError::Config(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> MarketDataConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MarketDataConfig::from_env_map(&vars).expect("config should parse")
    }

    #[test]
    fn test_tushare_requires_token() {
        let without = config(&[]);
        assert!(ProviderKind::Tushare.build(&without).unwrap().is_none());

        let with = config(&[("TUSHARE_TOKEN", "secret")]);
        let provider = ProviderKind::Tushare.build(&with).unwrap();
        assert_eq!(provider.map(|p| p.id()), Some("TUSHARE"));
    }

    #[test]
    fn test_disabled_provider_not_built() {
        let config = config(&[("YAHOO_ENABLED", "false")]);
        assert!(ProviderKind::Yahoo.build(&config).unwrap().is_none());
        assert!(ProviderKind::Eastmoney.build(&config).unwrap().is_some());
    }

    #[test]
    fn test_priority_override_reaches_provider() {
        let config = config(&[("EASTMONEY_PRIORITY", "7")]);
        let provider = ProviderKind::Eastmoney.build(&config).unwrap().unwrap();
        assert_eq!(provider.priority(), 7);
    }

    #[test]
    fn test_from_str_aliases() {
        assert_eq!("akshare".parse::<ProviderKind>().ok(), Some(ProviderKind::Eastmoney));
        assert_eq!("YAHOO".parse::<ProviderKind>().ok(), Some(ProviderKind::Yahoo));
        assert!("baostock".parse::<ProviderKind>().is_err());
    }
}
