use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// One trading day of OHLCV data.
///
/// Units are identical regardless of the originating provider:
/// prices in the listing currency, `volume` in shares, `amount` in currency units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Trading date
    pub date: NaiveDate,

    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,

    /// Traded volume in shares
    pub volume: Decimal,

    /// Traded value in currency units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,

    /// Percent change versus the previous close (e.g. 1.25 for +1.25%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_change: Option<Decimal>,
}

impl DailyBar {
    /// Create a bar from OHLCV values.
    pub fn ohlcv(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            amount: None,
            pct_change: None,
        }
    }
}

/// Sort bars ascending by date and drop duplicate dates (first one wins).
///
/// Bars without a vendor-reported `pct_change` get one derived from the
/// previous bar's close. The first bar of the series has no predecessor and
/// keeps `None`.
pub fn normalize_bars(mut bars: Vec<DailyBar>) -> Vec<DailyBar> {
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    fill_pct_change(&mut bars);
    bars
}

fn fill_pct_change(bars: &mut [DailyBar]) {
    for i in 1..bars.len() {
        if bars[i].pct_change.is_some() {
            continue;
        }
        let prev_close = bars[i - 1].close;
        if prev_close.is_zero() {
            continue;
        }
        let pct = (bars[i].close - prev_close) / prev_close * Decimal::ONE_HUNDRED;
        bars[i].pct_change =
            Some(pct.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero));
    }
}
