use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest traded price snapshot for one instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealtimeQuote {
    /// Bare instrument code (e.g. "600519")
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Last traded price (required)
    pub price: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<Decimal>,

    /// Percent change versus previous close (e.g. -0.85 for -0.85%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<Decimal>,

    /// Volume in shares
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,

    /// Traded value in currency units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,

    /// Vendor timestamp of the snapshot
    pub timestamp: DateTime<Utc>,
}

impl RealtimeQuote {
    /// Create a quote with only the required fields.
    pub fn new(code: impl Into<String>, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            name: None,
            price,
            open: None,
            high: None,
            low: None,
            prev_close: None,
            change_pct: None,
            volume: None,
            amount: None,
            timestamp,
        }
    }

    /// Derive `change_pct` from `price` and `prev_close` when the vendor omits it.
    pub fn fill_change_pct(&mut self) {
        if self.change_pct.is_some() {
            return;
        }
        if let Some(prev) = self.prev_close.filter(|p| !p.is_zero()) {
            let pct = (self.price - prev) / prev * Decimal::ONE_HUNDRED;
            self.change_pct = Some(pct.round_dp(2));
        }
    }
}
