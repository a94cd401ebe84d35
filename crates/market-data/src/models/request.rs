use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::capability::Capability;

/// Inclusive calendar date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, swapping the bounds if given in reverse.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// The `days` calendar days ending at (and including) `end`.
    pub fn last_days(end: NaiveDate, days: u32) -> Self {
        let span = chrono::Duration::days(i64::from(days.saturating_sub(1)));
        Self::new(end - span, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A single data request handed to the fetcher manager.
///
/// Requests are immutable once built; the manager and providers only borrow them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    capability: Capability,
    symbol: String,
    range: Option<DateRange>,
    cursor: Option<String>,
}

impl FetchRequest {
    pub fn new(capability: Capability, symbol: impl Into<String>) -> Self {
        Self {
            capability,
            symbol: symbol.into(),
            range: None,
            cursor: None,
        }
    }

    pub fn basic_info(symbol: impl Into<String>) -> Self {
        Self::new(Capability::BasicInfo, symbol)
    }

    pub fn daily_bars(symbol: impl Into<String>, range: DateRange) -> Self {
        Self::new(Capability::DailyBars, symbol).with_range(range)
    }

    pub fn realtime_quote(symbol: impl Into<String>) -> Self {
        Self::new(Capability::RealtimeQuote, symbol)
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_normalizes_reversed_bounds() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 1, 1));
        assert_eq!(range.start, date(2024, 1, 1));
        assert_eq!(range.end, date(2024, 3, 1));
    }

    #[test]
    fn test_last_days_is_inclusive() {
        let range = DateRange::last_days(date(2024, 1, 30), 30);
        assert_eq!(range.start, date(2024, 1, 1));
        assert!(range.contains(date(2024, 1, 30)));
        assert!(!range.contains(date(2024, 1, 31)));
    }

    #[test]
    fn test_builder() {
        let req = FetchRequest::daily_bars("600519", DateRange::last_days(date(2024, 1, 30), 5))
            .with_cursor("100");
        assert_eq!(req.capability(), Capability::DailyBars);
        assert_eq!(req.symbol(), "600519");
        assert_eq!(req.cursor(), Some("100"));
        assert!(req.range().is_some());
    }
}
