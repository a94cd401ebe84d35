use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bar::DailyBar;
use super::capability::Capability;
use super::profile::StockBasicInfo;
use super::quote::RealtimeQuote;
use super::types::ProviderId;

/// Capability-specific normalized data.
///
/// The shape for a given capability is the same no matter which provider
/// produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    BasicInfo(StockBasicInfo),
    DailyBars(Vec<DailyBar>),
    RealtimeQuote(RealtimeQuote),
}

impl Payload {
    /// The capability this payload answers.
    pub fn capability(&self) -> Capability {
        match self {
            Self::BasicInfo(_) => Capability::BasicInfo,
            Self::DailyBars(_) => Capability::DailyBars,
            Self::RealtimeQuote(_) => Capability::RealtimeQuote,
        }
    }
}

/// Successful outcome of a fetch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchResult {
    /// Provider that produced the payload
    pub provider: ProviderId,

    pub payload: Payload,

    pub fetched_at: DateTime<Utc>,

    /// Cursor for the next page, when the provider paginates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl FetchResult {
    pub fn new(provider: impl Into<ProviderId>, payload: Payload) -> Self {
        Self {
            provider: provider.into(),
            payload,
            fetched_at: Utc::now(),
            next_cursor: None,
        }
    }

    pub fn with_next_cursor(mut self, cursor: Option<String>) -> Self {
        self.next_cursor = cursor;
        self
    }

    pub fn into_daily_bars(self) -> Option<Vec<DailyBar>> {
        match self.payload {
            Payload::DailyBars(bars) => Some(bars),
            _ => None,
        }
    }

    pub fn into_basic_info(self) -> Option<StockBasicInfo> {
        match self.payload {
            Payload::BasicInfo(info) => Some(info),
            _ => None,
        }
    }

    pub fn into_realtime_quote(self) -> Option<RealtimeQuote> {
        match self.payload {
            Payload::RealtimeQuote(quote) => Some(quote),
            _ => None,
        }
    }
}
