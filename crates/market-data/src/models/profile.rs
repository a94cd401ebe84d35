use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Basic listing information for a stock.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StockBasicInfo {
    /// Bare instrument code (e.g. "600519")
    pub code: String,

    /// Short name (e.g. "贵州茅台")
    pub name: String,

    /// Industry classification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Region / province of domicile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    /// Market board (e.g. "主板", "创业板", "科创板")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_date: Option<NaiveDate>,

    /// Total shares outstanding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_shares: Option<Decimal>,

    /// Free-float shares
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float_shares: Option<Decimal>,

    /// Total market capitalization in currency units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_market_cap: Option<Decimal>,
}

impl StockBasicInfo {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}
