//! Eastmoney market data provider.
//!
//! Uses the public push2 / push2his endpoints that back the Eastmoney quote
//! pages (and the AkShare library):
//! - Daily bars via `/api/qt/stock/kline/get`
//! - Realtime snapshot and basic info via `/api/qt/stock/get`
//!
//! There is no documented quota, but fixed-interval callers get blocked, so
//! the provider declares a randomized pre-call delay.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProviderSettings;
use crate::errors::MarketDataError;
use crate::models::{
    normalize_bars, Capability, DailyBar, DateRange, FetchRequest, FetchResult, Payload,
    RealtimeQuote, StockBasicInfo, StockCode,
};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const STOCK_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
pub const PROVIDER_ID: &str = "EASTMONEY";

/// Shares per board lot; Eastmoney reports volume in lots.
const SHARES_PER_LOT: i64 = 100;

const QUOTE_FIELDS: &str = "f43,f44,f45,f46,f47,f48,f57,f58,f59,f60,f86,f170";
const PROFILE_FIELDS: &str = "f57,f58,f84,f85,f116,f127,f128,f189";

// ============================================================================
// API Response Structures
// ============================================================================

/// Envelope shared by both endpoints. `data` is null for unknown symbols.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    rc: i64,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

// ============================================================================
// EastmoneyProvider
// ============================================================================

/// Eastmoney market data provider.
///
/// Covers Shanghai, Shenzhen and Beijing listings only.
pub struct EastmoneyProvider {
    client: Client,
    priority: u8,
    rate_limit: RateLimit,
}

impl EastmoneyProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            client: super::http_client(settings.request_timeout),
            priority: settings.priority,
            rate_limit: settings.rate_limit.clone(),
        }
    }

    /// Make a GET request and return the body.
    async fn get(&self, url: &str, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        debug!("Eastmoney request: {} with {} params", url, params.len());

        let response = self
            .client
            .get(url)
            .query(params)
            .header(reqwest::header::REFERER, "https://quote.eastmoney.com/")
            .send()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::from_status(
                PROVIDER_ID,
                status.as_u16(),
                body,
            ));
        }

        response
            .text()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))
    }

    fn secid(&self, code: &StockCode) -> Result<String, MarketDataError> {
        code.eastmoney_secid()
            .ok_or_else(|| MarketDataError::SymbolNotSupported {
                provider: PROVIDER_ID.to_string(),
                symbol: code.to_string(),
            })
    }

    async fn fetch_daily_bars(
        &self,
        code: &StockCode,
        range: DateRange,
    ) -> Result<Vec<DailyBar>, MarketDataError> {
        let secid = self.secid(code)?;
        let beg = range.start.format("%Y%m%d").to_string();
        let end = range.end.format("%Y%m%d").to_string();

        let params = [
            ("secid", secid.as_str()),
            ("fields1", "f1,f2,f3,f4,f5,f6"),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61"),
            ("klt", "101"), // daily
            ("fqt", "0"),   // unadjusted
            ("beg", beg.as_str()),
            ("end", end.as_str()),
        ];

        let body = self.get(KLINE_URL, &params).await?;
        let bars = parse_klines(&body, code.code())?;
        debug!("Eastmoney returned {} bars for {}", bars.len(), code);
        Ok(bars)
    }

    async fn fetch_realtime_quote(&self, code: &StockCode) -> Result<RealtimeQuote, MarketDataError> {
        let secid = self.secid(code)?;
        let params = [("secid", secid.as_str()), ("fields", QUOTE_FIELDS)];
        let body = self.get(STOCK_URL, &params).await?;
        parse_quote(&body, code.code())
    }

    async fn fetch_basic_info(&self, code: &StockCode) -> Result<StockBasicInfo, MarketDataError> {
        let secid = self.secid(code)?;
        let params = [("secid", secid.as_str()), ("fields", PROFILE_FIELDS)];
        let body = self.get(STOCK_URL, &params).await?;
        parse_basic_info(&body, code.code())
    }
}

#[async_trait]
impl MarketDataProvider for EastmoneyProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            capabilities: &[
                Capability::BasicInfo,
                Capability::DailyBars,
                Capability::RealtimeQuote,
            ],
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
            Capability::BasicInfo => Payload::BasicInfo(self.fetch_basic_info(&code).await?),
        };

        Ok(FetchResult::new(PROVIDER_ID, payload))
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn parse_error(message: impl Into<String>) -> MarketDataError {
    MarketDataError::Parse {
        provider: PROVIDER_ID.to_string(),
        message: message.into(),
    }
}

fn no_data(code: &str) -> MarketDataError {
    MarketDataError::NoData {
        provider: PROVIDER_ID.to_string(),
        symbol: code.to_string(),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: &str, code: &str) -> Result<T, MarketDataError> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| parse_error(format!("Failed to parse response: {}", e)))?;
    if envelope.rc != 0 {
        return Err(parse_error(format!("Unexpected rc {}", envelope.rc)));
    }
    envelope.data.ok_or_else(|| no_data(code))
}

/// Read a numeric field; Eastmoney sends `"-"` for missing values.
fn number(fields: &Value, key: &str) -> Option<Decimal> {
    match fields.get(key)? {
        Value::Number(n) => {
            let s = n.to_string();
            s.parse().ok().or_else(|| Decimal::from_scientific(&s).ok())
        }
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn text(fields: &Value, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "-")
        .map(str::to_string)
}

/// Parse kline rows: `date,open,close,high,low,volume,amount,amplitude,pct_change,...`.
pub(super) fn parse_klines(body: &str, code: &str) -> Result<Vec<DailyBar>, MarketDataError> {
    let data: KlineData = decode(body, code)?;
    if data.klines.is_empty() {
        return Err(no_data(code));
    }

    let lots = Decimal::from(SHARES_PER_LOT);
    let mut bars = Vec::with_capacity(data.klines.len());
    for line in &data.klines {
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 7 {
            warn!("Skipping short kline row: {}", line);
            continue;
        }

        let Ok(date) = NaiveDate::parse_from_str(cols[0], "%Y-%m-%d") else {
            warn!("Skipping kline row with bad date: {}", line);
            continue;
        };
        let values: Option<Vec<Decimal>> = cols[1..6].iter().map(|c| c.parse().ok()).collect();
        let Some(values) = values else {
            warn!("Skipping kline row with bad prices: {}", line);
            continue;
        };

        let mut bar = DailyBar::ohlcv(
            date,
            values[0],
            values[2],
            values[3],
            values[1],
            values[4] * lots,
        );
        bar.amount = cols[6].parse().ok();
        bar.pct_change = cols.get(8).and_then(|c| c.parse().ok());
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(parse_error("No valid kline rows"));
    }
    Ok(normalize_bars(bars))
}

/// Parse the realtime snapshot. Prices are integers scaled by `10^f59`.
fn parse_quote(body: &str, code: &str) -> Result<RealtimeQuote, MarketDataError> {
    let fields: Value = decode(body, code)?;

    let scale = number(&fields, "f59").and_then(|d| d.to_u32()).unwrap_or(2);
    let price_of = |key: &str| number(&fields, key).map(|v| rescale(v, scale));

    let price = price_of("f43")
        .filter(|p| !p.is_zero())
        .ok_or_else(|| no_data(code))?;
    let timestamp = number(&fields, "f86")
        .and_then(|d| d.to_i64())
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    let quote_code = text(&fields, "f57").unwrap_or_else(|| code.to_string());
    let mut quote = RealtimeQuote::new(quote_code, price, timestamp);
    quote.name = text(&fields, "f58");
    quote.high = price_of("f44");
    quote.low = price_of("f45");
    quote.open = price_of("f46");
    quote.prev_close = price_of("f60");
    quote.volume = number(&fields, "f47").map(|v| v * Decimal::from(SHARES_PER_LOT));
    quote.amount = number(&fields, "f48");
    quote.change_pct = number(&fields, "f170").map(|v| rescale(v, 2));
    quote.fill_change_pct();
    Ok(quote)
}

fn parse_basic_info(body: &str, code: &str) -> Result<StockBasicInfo, MarketDataError> {
    let fields: Value = decode(body, code)?;

    let name = text(&fields, "f58").ok_or_else(|| no_data(code))?;
    let info_code = text(&fields, "f57").unwrap_or_else(|| code.to_string());
    let mut info = StockBasicInfo::new(info_code, name);
    info.industry = text(&fields, "f127");
    info.area = text(&fields, "f128");
    info.market = Some(board(&info.code).to_string());
    info.total_shares = number(&fields, "f84");
    info.float_shares = number(&fields, "f85");
    info.total_market_cap = number(&fields, "f116");
    info.list_date = number(&fields, "f189")
        .map(|d| d.trunc().to_string())
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y%m%d").ok());
    Ok(info)
}

fn rescale(value: Decimal, scale: u32) -> Decimal {
    let mut scaled = value;
    if scaled.set_scale(scaled.scale() + scale).is_err() {
        return value;
    }
    scaled.normalize()
}

/// Listing board derived from the code prefix.
fn board(code: &str) -> &'static str {
    match code {
        c if c.starts_with("688") => "科创板",
        c if c.starts_with("300") || c.starts_with("301") => "创业板",
        c if c.starts_with('4') || c.starts_with('8') => "北交所",
        _ => "主板",
    }
}
