//! Watchlist symbol parsing and per-vendor symbol rendering.
//!
//! Watchlist entries are usually bare six-digit A-share codes (`600519`).
//! The listing exchange is inferred from the leading digit, and each vendor
//! gets its own rendering of the same instrument.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mainland exchange an A-share is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Exchange {
    /// Infer the exchange from a six-digit code.
    ///
    /// - `6xxxxx`, `9xxxxx` (B shares) -> Shanghai
    /// - `0xxxxx`, `2xxxxx`, `3xxxxx` -> Shenzhen
    /// - `4xxxxx`, `8xxxxx` -> Beijing
    fn infer(code: &str) -> Option<Self> {
        match code.as_bytes().first()? {
            b'6' | b'9' => Some(Self::Shanghai),
            b'0' | b'2' | b'3' => Some(Self::Shenzhen),
            b'4' | b'8' => Some(Self::Beijing),
            _ => None,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "SH" | "SS" => Some(Self::Shanghai),
            "SZ" => Some(Self::Shenzhen),
            "BJ" | "BSE" => Some(Self::Beijing),
            _ => None,
        }
    }

    /// Suffix used by Tushare (`600519.SH`).
    pub fn tushare_suffix(&self) -> &'static str {
        match self {
            Self::Shanghai => "SH",
            Self::Shenzhen => "SZ",
            Self::Beijing => "BJ",
        }
    }

    /// Market prefix used in Eastmoney `secid` values (`1.600519`).
    pub fn eastmoney_market(&self) -> u8 {
        match self {
            Self::Shanghai => 1,
            Self::Shenzhen | Self::Beijing => 0,
        }
    }

    /// Suffix used by Yahoo Finance. Beijing listings are not covered.
    pub fn yahoo_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Shanghai => Some("SS"),
            Self::Shenzhen => Some("SZ"),
            Self::Beijing => None,
        }
    }
}

/// A parsed watchlist symbol.
///
/// `exchange` is `None` for tickers outside the mainland markets (`AAPL`,
/// `0700.HK`); those are only servable by vendors with global coverage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StockCode {
    code: String,
    exchange: Option<Exchange>,
}

impl StockCode {
    /// Parse a watchlist entry.
    ///
    /// Accepts `600519`, `600519.SH`, `600519.SS`, `sh600519` and plain
    /// foreign tickers. Returns `None` for empty or malformed input.
    pub fn parse(raw: &str) -> Option<Self> {
        let symbol = raw.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return None;
        }

        if let Some((code, suffix)) = symbol.split_once('.') {
            if is_a_share_code(code) {
                if let Some(exchange) = Exchange::from_suffix(suffix) {
                    return Some(Self::a_share(code, exchange));
                }
            }
            return Self::foreign(&symbol);
        }

        for (prefix, exchange) in [
            ("SH", Exchange::Shanghai),
            ("SZ", Exchange::Shenzhen),
            ("BJ", Exchange::Beijing),
        ] {
            if let Some(code) = symbol.strip_prefix(prefix) {
                if is_a_share_code(code) {
                    return Some(Self::a_share(code, exchange));
                }
            }
        }

        if is_a_share_code(&symbol) {
            return Exchange::infer(&symbol).map(|exchange| Self::a_share(&symbol, exchange));
        }

        Self::foreign(&symbol)
    }

    fn a_share(code: &str, exchange: Exchange) -> Self {
        Self {
            code: code.to_string(),
            exchange: Some(exchange),
        }
    }

    fn foreign(symbol: &str) -> Option<Self> {
        let valid = symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
        valid.then(|| Self {
            code: symbol.to_string(),
            exchange: None,
        })
    }

    /// Bare code (`600519`) or the foreign ticker as given.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn exchange(&self) -> Option<Exchange> {
        self.exchange
    }

    pub fn is_a_share(&self) -> bool {
        self.exchange.is_some()
    }

    /// Tushare `ts_code`, e.g. `600519.SH`.
    pub fn tushare_code(&self) -> Option<String> {
        self.exchange
            .map(|ex| format!("{}.{}", self.code, ex.tushare_suffix()))
    }

    /// Eastmoney `secid`, e.g. `1.600519`.
    pub fn eastmoney_secid(&self) -> Option<String> {
        self.exchange
            .map(|ex| format!("{}.{}", ex.eastmoney_market(), self.code))
    }

    /// Yahoo Finance symbol, e.g. `600519.SS`; foreign tickers pass through.
    pub fn yahoo_symbol(&self) -> Option<String> {
        match self.exchange {
            Some(ex) => ex
                .yahoo_suffix()
                .map(|suffix| format!("{}.{}", self.code, suffix)),
            None => Some(self.code.clone()),
        }
    }
}

impl fmt::Display for StockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exchange {
            Some(ex) => write!(f, "{}.{}", self.code, ex.tushare_suffix()),
            None => f.write_str(&self.code),
        }
    }
}

fn is_a_share_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_code_infers_exchange() {
        assert_eq!(
            StockCode::parse("600519").unwrap().exchange(),
            Some(Exchange::Shanghai)
        );
        assert_eq!(
            StockCode::parse("000001").unwrap().exchange(),
            Some(Exchange::Shenzhen)
        );
        assert_eq!(
            StockCode::parse("300750").unwrap().exchange(),
            Some(Exchange::Shenzhen)
        );
        assert_eq!(
            StockCode::parse("830799").unwrap().exchange(),
            Some(Exchange::Beijing)
        );
    }

    #[test]
    fn test_suffixed_and_prefixed_forms() {
        let a = StockCode::parse("600519.SS").unwrap();
        let b = StockCode::parse("sh600519").unwrap();
        let c = StockCode::parse(" 600519.sh ").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.code(), "600519");
    }

    #[test]
    fn test_vendor_renderings() {
        let code = StockCode::parse("000001").unwrap();
        assert_eq!(code.tushare_code().as_deref(), Some("000001.SZ"));
        assert_eq!(code.eastmoney_secid().as_deref(), Some("0.000001"));
        assert_eq!(code.yahoo_symbol().as_deref(), Some("000001.SZ"));

        let moutai = StockCode::parse("600519").unwrap();
        assert_eq!(moutai.eastmoney_secid().as_deref(), Some("1.600519"));
        assert_eq!(moutai.yahoo_symbol().as_deref(), Some("600519.SS"));
    }

    #[test]
    fn test_foreign_ticker_only_renders_for_yahoo() {
        let aapl = StockCode::parse("aapl").unwrap();
        assert!(!aapl.is_a_share());
        assert_eq!(aapl.yahoo_symbol().as_deref(), Some("AAPL"));
        assert!(aapl.tushare_code().is_none());
        assert!(aapl.eastmoney_secid().is_none());
    }

    #[test]
    fn test_beijing_not_on_yahoo() {
        let code = StockCode::parse("430047").unwrap();
        assert!(code.yahoo_symbol().is_none());
        assert_eq!(code.tushare_code().as_deref(), Some("430047.BJ"));
    }

    #[test]
    fn test_malformed_input() {
        assert!(StockCode::parse("").is_none());
        assert!(StockCode::parse("   ").is_none());
        assert!(StockCode::parse("60 0519").is_none());
        // Six digits with an unknown leading digit.
        assert!(StockCode::parse("100000").is_none());
    }
}
