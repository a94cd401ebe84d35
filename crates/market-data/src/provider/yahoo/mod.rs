//! Yahoo Finance market data provider.
//!
//! - Daily bars via the v8 chart endpoint (no session needed)
//! - Realtime quotes via the v7 quote endpoint, which requires a
//!   cookie + crumb session pair
//!
//! The session pair expires; it is held in a [`CredentialCache`] and refreshed
//! on demand. A 401 drops it so the next call starts a fresh session.
//!
//! Mainland listings are addressed as `600519.SS` / `000001.SZ`; other
//! tickers are passed through unchanged.

mod models;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveTime, TimeZone, Utc};
use reqwest::{header, Client, StatusCode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::config::ProviderSettings;
use crate::credentials::CredentialCache;
use crate::errors::MarketDataError;
use crate::models::{
    normalize_bars, Capability, DailyBar, DateRange, FetchRequest, FetchResult, Payload,
    RealtimeQuote, StockCode,
};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

use models::{YahooChartResponse, YahooQuoteResponse};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
pub const PROVIDER_ID: &str = "YAHOO";

/// How long a session pair is reused before refreshing.
const CRUMB_TTL: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// Crumb/Cookie Authentication
// ============================================================================

/// Yahoo session credential
#[derive(Debug, Clone)]
struct CrumbData {
    cookie: String,
    crumb: String,
}

// ============================================================================
// Yahoo Provider
// ============================================================================

/// Yahoo Finance market data provider.
pub struct YahooProvider {
    client: Client,
    crumb: CredentialCache<CrumbData>,
    priority: u8,
    rate_limit: RateLimit,
}

impl YahooProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            client: super::http_client(settings.request_timeout),
            crumb: CredentialCache::new("yahoo-crumb"),
            priority: settings.priority,
            rate_limit: settings.rate_limit.clone(),
        }
    }

    fn symbol(&self, code: &StockCode) -> Result<String, MarketDataError> {
        code.yahoo_symbol()
            .ok_or_else(|| MarketDataError::SymbolNotSupported {
                provider: PROVIDER_ID.to_string(),
                symbol: code.to_string(),
            })
    }

    // ========================================================================
    // Crumb/Cookie Authentication
    // ========================================================================

    async fn session(&self) -> Result<CrumbData, MarketDataError> {
        self.crumb
            .get_or_refresh(|| async { self.fetch_crumb().await.map(|crumb| (crumb, CRUMB_TTL)) })
            .await
    }

    /// Fetch a new Yahoo session: cookie from fc.yahoo.com, then the crumb.
    async fn fetch_crumb(&self) -> Result<CrumbData, MarketDataError> {
        let response = self
            .client
            .get(COOKIE_URL)
            .send()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(v, _)| v.to_string()))
            .ok_or_else(|| MarketDataError::Authentication {
                provider: PROVIDER_ID.to_string(),
                message: "Failed to parse Yahoo cookie".to_string(),
            })?;

        let response = self
            .client
            .get(CRUMB_URL)
            .header(header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::from_status(PROVIDER_ID, status.as_u16(), body));
        }

        let crumb = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?
            .trim()
            .to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(MarketDataError::Authentication {
                provider: PROVIDER_ID.to_string(),
                message: "Yahoo returned an invalid crumb".to_string(),
            });
        }

        debug!("Yahoo session refreshed");
        Ok(CrumbData { cookie, crumb })
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    async fn fetch_daily_bars(
        &self,
        code: &StockCode,
        range: DateRange,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        let symbol = self.symbol(code)?;
        let period1 = Utc
            .from_utc_datetime(&range.start.and_time(NaiveTime::MIN))
            .timestamp()
            .to_string();
        // period2 is exclusive
        let period2 = Utc
            .from_utc_datetime(&range.end.and_time(NaiveTime::MIN))
            .timestamp()
            .saturating_add(86_400)
            .to_string();

        let url = format!("{}/{}", CHART_URL, encode(&symbol));
        debug!("Yahoo chart request: {}", symbol);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
                ("events", "history"),
            ])
            .send()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(no_data(&symbol));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::from_status(PROVIDER_ID, status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;
        let bars = parse_chart(&body, &symbol)?;
        Ok(bars.into_iter().filter(|b| range.contains(b.date)).collect())
    }

    async fn fetch_realtime_quote(&self, code: &StockCode) -> Result<RealtimeQuote, MarketDataError> {
        let symbol = self.symbol(code)?;
        let session = self.session().await?;

        let url = format!(
            "{}?symbols={}&crumb={}",
            QUOTE_URL,
            encode(&symbol),
            encode(&session.crumb)
        );

        let response = self
            .client
            .get(&url)
            .header(header::COOKIE, &session.cookie)
            .send()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("Yahoo session rejected, clearing crumb");
            self.crumb.invalidate().await;
            return Err(MarketDataError::Authentication {
                provider: PROVIDER_ID.to_string(),
                message: "Yahoo authentication expired".to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::from_status(PROVIDER_ID, status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;
        let mut quote = parse_quote(&body, &symbol)?;
        quote.code = code.code().to_string();
        Ok(quote)
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            capabilities: &[Capability::DailyBars, Capability::RealtimeQuote],
            supports_paging: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit.clone()
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, MarketDataError> {
        let code = super::stock_code(PROVIDER_ID, request.symbol())?;

        let payload = match request.capability() {
            Capability::DailyBars => {
                let range = super::requested_range(request);
                Payload::DailyBars(self.fetch_daily_bars(&code, range).await?)
            }
            Capability::RealtimeQuote => {
                Payload::RealtimeQuote(self.fetch_realtime_quote(&code).await?)
            }
            capability => {
                return Err(MarketDataError::CapabilityNotSupported {
                    provider: PROVIDER_ID.to_string(),
                    capability,
                })
            }
        };

        Ok(FetchResult::new(PROVIDER_ID, payload))
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn no_data(symbol: &str) -> MarketDataError {
    MarketDataError::NoData {
        provider: PROVIDER_ID.to_string(),
        symbol: symbol.to_string(),
    }
}

fn parse_error(message: impl Into<String>) -> MarketDataError {
    MarketDataError::Parse {
        provider: PROVIDER_ID.to_string(),
        message: message.into(),
    }
}

fn decimal(value: Option<f64>) -> Option<Decimal> {
    value
        .filter(|v| v.is_finite())
        .and_then(Decimal::from_f64)
        .map(|d| d.normalize())
}

pub(super) fn parse_chart(body: &str, symbol: &str) -> Result<Vec<DailyBar>, MarketDataError> {
    let response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| parse_error(format!("Failed to parse chart response: {}", e)))?;

    if let Some(error) = response.chart.error {
        debug!(
            "Yahoo chart error for {}: {:?} {:?}",
            symbol, error.code, error.description
        );
        return Err(no_data(symbol));
    }

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| no_data(symbol))?;
    let Some(quote) = result.indicators.quote.first() else {
        return Err(no_data(symbol));
    };

    let offset = result.meta.gmtoffset;
    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let column = |values: &Vec<Option<f64>>| decimal(values.get(i).copied().flatten());

        let (Some(open), Some(high), Some(low), Some(close)) = (
            column(&quote.open),
            column(&quote.high),
            column(&quote.low),
            column(&quote.close),
        ) else {
            // Halted days come back as nulls
            continue;
        };
        let Some(local) = Utc.timestamp_opt(ts.saturating_add(offset), 0).single() else {
            warn!("Invalid timestamp at index {}: {}", i, ts);
            continue;
        };

        let volume = column(&quote.volume).unwrap_or_default();
        bars.push(DailyBar::ohlcv(local.date_naive(), open, high, low, close, volume));
    }

    if bars.is_empty() {
        return Err(no_data(symbol));
    }
    Ok(normalize_bars(bars))
}

fn parse_quote(body: &str, symbol: &str) -> Result<RealtimeQuote, MarketDataError> {
    let response: YahooQuoteResponse = serde_json::from_str(body)
        .map_err(|e| parse_error(format!("Failed to parse quote response: {}", e)))?;

    let result = response
        .quote_response
        .result
        .into_iter()
        .find(|r| r.symbol.eq_ignore_ascii_case(symbol))
        .ok_or_else(|| no_data(symbol))?;

    let price = decimal(result.regular_market_price).ok_or_else(|| no_data(symbol))?;
    let timestamp = result
        .regular_market_time
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    let mut quote = RealtimeQuote::new(result.symbol, price, timestamp);
    quote.name = result.short_name.or(result.long_name);
    quote.open = decimal(result.regular_market_open);
    quote.high = decimal(result.regular_market_day_high);
    quote.low = decimal(result.regular_market_day_low);
    quote.prev_close = decimal(result.regular_market_previous_close);
    quote.change_pct = decimal(result.regular_market_change_percent).map(|p| p.round_dp(2));
    quote.volume = decimal(result.regular_market_volume);
    quote.fill_change_pct();
    Ok(quote)
}
