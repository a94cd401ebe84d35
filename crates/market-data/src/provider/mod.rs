//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Provider capabilities and rate limiting configuration
//! - Concrete adapters (Eastmoney, Tushare, Yahoo) and the factory that
//!   builds them from configuration
//!
//! Adapters make exactly one vendor call per `fetch`; quota, jitter, retries
//! and failover are applied by the registry.

mod capabilities;
mod kind;
mod traits;

pub mod eastmoney;
pub mod tushare;
pub mod yahoo;

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::warn;

use crate::errors::MarketDataError;
use crate::models::{DateRange, FetchRequest, StockCode};

// Re-exports
pub use capabilities::{JitterRange, ProviderCapabilities, RateLimit};
pub use kind::ProviderKind;
pub use traits::MarketDataProvider;

/// Lookback used when a daily-bars request carries no range.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 120;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|e| {
            warn!(
                "Failed to build HTTP client ({}), falling back to defaults without timeout or user agent",
                e
            );
            Client::new()
        })
}

fn stock_code(provider: &str, symbol: &str) -> Result<StockCode, MarketDataError> {
    StockCode::parse(symbol).ok_or_else(|| MarketDataError::SymbolNotSupported {
        provider: provider.to_string(),
        symbol: symbol.to_string(),
    })
}

fn requested_range(request: &FetchRequest) -> DateRange {
    request
        .range()
        .unwrap_or_else(|| DateRange::last_days(Utc::now().date_naive(), DEFAULT_LOOKBACK_DAYS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyBar;
    use rust_decimal_macros::dec;

    // Two sessions of 600519 as each vendor reports them.
    const EASTMONEY_KLINES: &str = r#"{"rc":0,"data":{"code":"600519","klines":[
        "2024-01-02,1715.00,1685.25,1718.50,1678.125,32155,5440082448.00,2.35,-1.81",
        "2024-01-03,1680.00,1694.50,1700.00,1675.50,25000,4230000000.00,1.46,0.55"
    ]}}"#;

    const TUSHARE_DAILY: &str = r#"{"code":0,"msg":"","data":{
        "fields":["ts_code","trade_date","open","high","low","close","pre_close","pct_chg","vol","amount"],
        "items":[
            ["600519.SH","20240103",1680.0,1700.0,1675.5,1694.5,1685.25,0.55,25000.0,4230000.0],
            ["600519.SH","20240102",1715.0,1718.5,1678.125,1685.25,1716.0,-1.81,32155.0,5440082.448]
        ]}}"#;

    const YAHOO_CHART: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"600519.SS","currency":"CNY","gmtoffset":28800},
        "timestamp":[1704159000,1704245400],
        "indicators":{"quote":[{
            "open":[1715.0,1680.0],
            "high":[1718.5,1700.0],
            "low":[1678.125,1675.5],
            "close":[1685.25,1694.5],
            "volume":[3215500,2500000]
        }]}}],"error":null}}"#;

    fn assert_same_session(label: &str, expected: &DailyBar, actual: &DailyBar) {
        assert_eq!(actual.date, expected.date, "{label} date");
        assert_eq!(actual.open, expected.open, "{label} open");
        assert_eq!(actual.high, expected.high, "{label} high");
        assert_eq!(actual.low, expected.low, "{label} low");
        assert_eq!(actual.close, expected.close, "{label} close");
        assert_eq!(actual.volume, expected.volume, "{label} volume");
    }

    #[test]
    fn test_daily_bars_agree_across_providers() {
        let eastmoney = eastmoney::parse_klines(EASTMONEY_KLINES, "600519").unwrap();
        let table = tushare::parse_response(TUSHARE_DAILY).unwrap();
        let tushare = tushare::parse_daily(&table, "600519").unwrap();
        let yahoo = yahoo::parse_chart(YAHOO_CHART, "600519.SS").unwrap();

        assert_eq!(eastmoney.len(), 2);
        assert_eq!(tushare.len(), 2);
        assert_eq!(yahoo.len(), 2);

        for i in 0..2 {
            assert_same_session("tushare", &eastmoney[i], &tushare[i]);
            assert_same_session("yahoo", &eastmoney[i], &yahoo[i]);
            assert_eq!(tushare[i].amount, eastmoney[i].amount);
        }

        assert_eq!(eastmoney[0].volume, dec!(3215500));
        assert_eq!(eastmoney[0].low, dec!(1678.125));

        // Yahoo has no vendor change figure; the second session is derived.
        assert_eq!(eastmoney[1].pct_change, Some(dec!(0.55)));
        assert_eq!(tushare[1].pct_change, Some(dec!(0.55)));
        assert_eq!(yahoo[1].pct_change, Some(dec!(0.55)));
        assert_eq!(yahoo[0].pct_change, None);
        assert_eq!(yahoo[0].amount, None);
    }

    #[test]
    fn test_http_client_builds_with_timeout() {
        // Must not fall back or panic for ordinary settings.
        let _client = http_client(Duration::from_secs(10));
    }
}
