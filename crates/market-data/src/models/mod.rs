//! Market data models
//!
//! This module contains the core data types for market data operations:
//! - `types` - Type aliases for common identifiers (ProviderId)
//! - `capability` - Kinds of data requests (Capability)
//! - `symbol` - Watchlist symbol parsing and vendor renderings (StockCode)
//! - `request` - Request types (FetchRequest, DateRange)
//! - `bar`, `quote`, `profile` - Normalized payload schemas
//! - `result` - Fetch outcome (FetchResult, Payload)

mod bar;
mod capability;
mod profile;
mod quote;
mod request;
mod result;
mod symbol;
mod types;

pub use bar::{normalize_bars, DailyBar};
pub use capability::Capability;
pub use profile::StockBasicInfo;
pub use quote::RealtimeQuote;
pub use request::{DateRange, FetchRequest};
pub use result::{FetchResult, Payload};
pub use symbol::{Exchange, StockCode};
pub use types::ProviderId;
