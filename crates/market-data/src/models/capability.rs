use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of data request a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Static company information (name, industry, listing date).
    BasicInfo,
    /// Historical daily OHLCV bars.
    DailyBars,
    /// Latest traded price snapshot.
    RealtimeQuote,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::BasicInfo,
        Capability::DailyBars,
        Capability::RealtimeQuote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicInfo => "basic_info",
            Self::DailyBars => "daily_bars",
            Self::RealtimeQuote => "realtime_quote",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic_info" | "basic" | "info" => Ok(Self::BasicInfo),
            "daily_bars" | "daily" | "bars" => Ok(Self::DailyBars),
            "realtime_quote" | "realtime" | "quote" => Ok(Self::RealtimeQuote),
            other => Err(format!("unknown capability: {}", other)),
        }
    }
}
