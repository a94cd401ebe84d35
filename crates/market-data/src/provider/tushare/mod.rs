//! Tushare Pro market data provider.
//!
//! Token-authenticated JSON API: every call is a POST of
//! `{api_name, token, params, fields}` to a single endpoint, answered with a
//! column-oriented table (`fields` + `items`).
//!
//! - Daily bars via `daily` (paged with `limit` / `offset`)
//! - Basic info via `stock_basic`
//!
//! The free tier allows 80 calls per minute; quota errors come back as
//! HTTP 200 with a non-zero `code`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ProviderSettings;
use crate::errors::MarketDataError;
use crate::models::{
    normalize_bars, Capability, DailyBar, FetchRequest, FetchResult, Payload, StockBasicInfo,
    StockCode,
};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "http://api.tushare.pro";
pub const PROVIDER_ID: &str = "TUSHARE";

/// Rows per `daily` page.
const PAGE_SIZE: usize = 5000;

/// Tushare reports `vol` in lots and `amount` in thousands of yuan.
const SHARES_PER_LOT: i64 = 100;
const YUAN_PER_AMOUNT_UNIT: i64 = 1000;

const DAILY_FIELDS: &str = "ts_code,trade_date,open,high,low,close,pre_close,pct_chg,vol,amount";
const BASIC_FIELDS: &str = "ts_code,symbol,name,area,industry,market,list_date";

// ============================================================================
// API Request / Response Structures
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: Value,
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<Table>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Table {
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

impl Table {
    fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        let columns: HashMap<&str, usize> = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        self.items.iter().map(move |values| Row {
            columns: columns.clone(),
            values,
        })
    }
}

struct Row<'a> {
    columns: HashMap<&'a str, usize>,
    values: &'a [Value],
}

impl Row<'_> {
    fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .get(column)
            .and_then(|&i| self.values.get(i))
            .filter(|v| !v.is_null())
    }

    fn decimal(&self, column: &str) -> Option<Decimal> {
        match self.get(column)? {
            Value::Number(n) => {
                let s = n.to_string();
                s.parse().ok().or_else(|| Decimal::from_scientific(&s).ok())
            }
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn text(&self, column: &str) -> Option<String> {
        self.get(column)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn date(&self, column: &str) -> Option<NaiveDate> {
        self.text(column)
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y%m%d").ok())
    }
}

// ============================================================================
// TushareProvider
// ============================================================================

/// Tushare Pro market data provider.
///
/// Only constructed when a token is configured.
pub struct TushareProvider {
    client: Client,
    token: String,
    priority: u8,
    rate_limit: RateLimit,
}

impl TushareProvider {
    pub fn new(token: String, settings: &ProviderSettings) -> Self {
        Self {
            client: super::http_client(settings.request_timeout),
            token,
            priority: settings.priority,
            rate_limit: settings.rate_limit.clone(),
        }
    }

    /// Call one API and return its table.
    async fn call(&self, api_name: &str, params: Value, fields: &str) -> Result<Table, MarketDataError> {
        debug!("Tushare request: {}", api_name);

        let body = ApiRequest {
            api_name,
            token: &self.token,
            params,
            fields,
        };

        let response = self
            .client
            .post(BASE_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MarketDataError::from_status(PROVIDER_ID, status.as_u16(), text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_reqwest(PROVIDER_ID, e))?;
        parse_response(&text)
    }

    fn ts_code(&self, code: &StockCode) -> Result<String, MarketDataError> {
        code.tushare_code()
            .ok_or_else(|| MarketDataError::SymbolNotSupported {
                provider: PROVIDER_ID.to_string(),
                symbol: code.to_string(),
            })
    }

    async fn fetch_daily_bars(
        &self,
        code: &StockCode,
        request: &FetchRequest,
    ) -> Result<(Vec<DailyBar>, Option<String>), MarketDataError> {
        let range = super::requested_range(request);
        let offset = match request.cursor() {
            Some(cursor) => cursor.parse::<usize>().map_err(|_| MarketDataError::InvalidRequest {
                provider: PROVIDER_ID.to_string(),
                message: format!("Invalid paging cursor '{}'", cursor),
            })?,
            None => 0,
        };

        let params = json!({
            "ts_code": self.ts_code(code)?,
            "start_date": range.start.format("%Y%m%d").to_string(),
            "end_date": range.end.format("%Y%m%d").to_string(),
            "limit": PAGE_SIZE,
            "offset": offset,
        });

        let table = self.call("daily", params, DAILY_FIELDS).await?;
        let rows = table.items.len();
        let bars = parse_daily(&table, code.code())?;
        let next_cursor = next_page_cursor(offset, rows);

        debug!(
            "Tushare returned {} bars for {} (more pages: {})",
            bars.len(),
            code,
            next_cursor.is_some()
        );
        Ok((bars, next_cursor))
    }

    async fn fetch_basic_info(&self, code: &StockCode) -> Result<StockBasicInfo, MarketDataError> {
        let params = json!({ "ts_code": self.ts_code(code)? });
        let table = self.call("stock_basic", params, BASIC_FIELDS).await?;
        parse_basic_info(&table, code.code())
    }
}

#[async_trait]
impl MarketDataProvider for TushareProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            capabilities: &[Capability::BasicInfo, Capability::DailyBars],
            supports_paging: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit.clone()
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, MarketDataError> {
        let code = super::stock_code(PROVIDER_ID, request.symbol())?;

        match request.capability() {
            Capability::DailyBars => {
                let (bars, next_cursor) = self.fetch_daily_bars(&code, request).await?;
                Ok(FetchResult::new(PROVIDER_ID, Payload::DailyBars(bars))
                    .with_next_cursor(next_cursor))
            }
            Capability::BasicInfo => {
                let info = self.fetch_basic_info(&code).await?;
                Ok(FetchResult::new(PROVIDER_ID, Payload::BasicInfo(info)))
            }
            capability => Err(MarketDataError::CapabilityNotSupported {
                provider: PROVIDER_ID.to_string(),
                capability,
            }),
        }
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

/// Decode the envelope and map vendor error codes.
/// Cursor for the page after one that returned `rows` rows at `offset`.
/// Only a full page implies more rows.
fn next_page_cursor(offset: usize, rows: usize) -> Option<String> {
    (rows >= PAGE_SIZE).then(|| (offset + rows).to_string())
}

pub(super) fn parse_response(body: &str) -> Result<Table, MarketDataError> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| parse_error(format!("Failed to parse response: {}", e)))?;

    if response.code != 0 {
        let message = response.msg.unwrap_or_default();
        return Err(map_api_error(response.code, message));
    }

    response
        .data
        .ok_or_else(|| parse_error("Response has no data table"))
}

fn map_api_error(code: i64, message: String) -> MarketDataError {
    let provider = PROVIDER_ID.to_string();
    if code == 40203 || message.contains("每分钟") || message.contains("最多访问") {
        warn!("Tushare quota exceeded: {}", message);
        return MarketDataError::RateLimited { provider };
    }
    if matches!(code, 40101 | 40102) || message.contains("token") || message.contains("权限") {
        return MarketDataError::Authentication { provider, message };
    }
    MarketDataError::InvalidRequest {
        provider,
        message: format!("code {}: {}", code, message),
    }
}

pub(super) fn parse_daily(table: &Table, code: &str) -> Result<Vec<DailyBar>, MarketDataError> {
    if table.items.is_empty() {
        return Err(MarketDataError::NoData {
            provider: PROVIDER_ID.to_string(),
            symbol: code.to_string(),
        });
    }

    let lots = Decimal::from(SHARES_PER_LOT);
    let amount_unit = Decimal::from(YUAN_PER_AMOUNT_UNIT);

    let mut bars = Vec::with_capacity(table.items.len());
    for row in table.rows() {
        let (Some(date), Some(open), Some(high), Some(low), Some(close)) = (
            row.date("trade_date"),
            row.decimal("open"),
            row.decimal("high"),
            row.decimal("low"),
            row.decimal("close"),
        ) else {
            warn!("Skipping incomplete Tushare daily row for {}", code);
            continue;
        };

        let volume = row.decimal("vol").unwrap_or_default() * lots;
        let mut bar = DailyBar::ohlcv(date, open, high, low, close, volume);
        bar.amount = row.decimal("amount").map(|a| a * amount_unit);
        bar.pct_change = row.decimal("pct_chg");
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(parse_error("No valid daily rows"));
    }
    Ok(normalize_bars(bars))
}

fn parse_basic_info(table: &Table, code: &str) -> Result<StockBasicInfo, MarketDataError> {
    let row = table.rows().next().ok_or_else(|| MarketDataError::NoData {
        provider: PROVIDER_ID.to_string(),
        symbol: code.to_string(),
    })?;

    let name = row
        .text("name")
        .ok_or_else(|| parse_error("stock_basic row has no name"))?;
    let mut info = StockBasicInfo::new(row.text("symbol").unwrap_or_else(|| code.to_string()), name);
    info.area = row.text("area");
    info.industry = row.text("industry");
    info.market = row.text("market");
    info.list_date = row.date("list_date");
    Ok(info)
}
