//! Sources of the symbols to fetch.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{FetchRequest, StockCode};

/// Supplies the watchlist.
///
/// Implemented by the configured stock list and the `STOCK_LIST` reader here;
/// document- or table-backed sources live outside this crate.
#[async_trait]
pub trait WatchlistSource: Send + Sync {
    async fn symbols(&self) -> Result<Vec<String>, MarketDataError>;
}

/// Fixed watchlist, usually from `STOCK_LIST`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticWatchlist {
    symbols: Vec<String>,
}

impl StaticWatchlist {
    /// Trims entries and drops blanks and duplicates, keeping first-seen order.
    pub fn new(symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = symbol.into().trim().to_string();
            if !symbol.is_empty() && !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }
        Self { symbols: unique }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols that do not parse as a stock code.
    pub fn unrecognized(&self) -> Vec<&str> {
        self.symbols
            .iter()
            .filter(|s| StockCode::parse(s).is_none())
            .map(String::as_str)
            .collect()
    }

    /// One request per symbol, built by `make`.
    pub fn requests<F>(&self, make: F) -> Vec<FetchRequest>
    where
        F: Fn(&str) -> FetchRequest,
    {
        self.symbols.iter().map(|s| make(s)).collect()
    }
}

#[async_trait]
impl WatchlistSource for StaticWatchlist {
    async fn symbols(&self) -> Result<Vec<String>, MarketDataError> {
        Ok(self.symbols.clone())
    }
}

/// Symbol used when `STOCK_LIST` is unset or blank at refresh time.
pub const FALLBACK_SYMBOL: &str = "000001";

/// Re-reads `STOCK_LIST` on every [`symbols`](WatchlistSource::symbols) call,
/// so edits to the env file take effect on the next run without a restart.
///
/// A non-blank value in the env file wins over the process environment.
/// When both are blank the list is [`FALLBACK_SYMBOL`].
#[derive(Clone)]
pub struct EnvWatchlist {
    env_file: Option<PathBuf>,
    process_env: fn(&str) -> Option<String>,
}

impl EnvWatchlist {
    /// Reads `.env` in the working directory, then the process environment.
    pub fn new() -> Self {
        Self::with_env_file(".env")
    }

    pub fn with_env_file(path: impl Into<PathBuf>) -> Self {
        Self {
            env_file: Some(path.into()),
            process_env: |key| std::env::var(key).ok(),
        }
    }

    /// Process environment only.
    pub fn process_only() -> Self {
        Self {
            env_file: None,
            process_env: |key| std::env::var(key).ok(),
        }
    }

    /// Replace the process environment lookup.
    pub fn with_process_env(mut self, lookup: fn(&str) -> Option<String>) -> Self {
        self.process_env = lookup;
        self
    }

    /// Current watchlist.
    pub fn load(&self) -> StaticWatchlist {
        let raw = self
            .env_file
            .as_deref()
            .and_then(|path| read_env_file_value(path, "STOCK_LIST"))
            .filter(|value| !value.trim().is_empty())
            .or_else(|| (self.process_env)("STOCK_LIST"))
            .unwrap_or_default();

        let watchlist = StaticWatchlist::new(raw.split(','));
        if watchlist.is_empty() {
            debug!("STOCK_LIST is empty, watching {}", FALLBACK_SYMBOL);
            return StaticWatchlist::new([FALLBACK_SYMBOL]);
        }
        watchlist
    }
}

impl std::fmt::Debug for EnvWatchlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvWatchlist")
            .field("env_file", &self.env_file)
            .finish_non_exhaustive()
    }
}

impl Default for EnvWatchlist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WatchlistSource for EnvWatchlist {
    async fn symbols(&self) -> Result<Vec<String>, MarketDataError> {
        Ok(self.load().as_slice().to_vec())
    }
}

/// Value of `key` in a dotenv file, without touching the process environment.
fn read_env_file_value(path: &Path, key: &str) -> Option<String> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(dotenvy::Error::Io(e)) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to open env file {}: {}", path.display(), e);
            return None;
        }
    };

    let mut found = None;
    for entry in entries {
        match entry {
            Ok((name, value)) if name == key => found = Some(value),
            Ok(_) => {}
            Err(e) => {
                warn!("Skipping unreadable line in {}: {}", path.display(), e);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Capability;

    #[test]
    fn test_new_trims_and_dedups() {
        let watchlist = StaticWatchlist::new([" 600519", "000001", "", "600519 "]);
        assert_eq!(watchlist.as_slice(), &["600519", "000001"]);
        assert_eq!(watchlist.len(), 2);
    }

    #[test]
    fn test_requests_preserve_order() {
        let watchlist = StaticWatchlist::new(["300750", "600519"]);
        let requests = watchlist.requests(|s| FetchRequest::realtime_quote(s));

        let symbols: Vec<_> = requests.iter().map(|r| r.symbol()).collect();
        assert_eq!(symbols, vec!["300750", "600519"]);
        assert!(requests
            .iter()
            .all(|r| r.capability() == Capability::RealtimeQuote));
    }

    #[tokio::test]
    async fn test_symbols() {
        let watchlist = StaticWatchlist::new(["600519"]);
        assert_eq!(watchlist.symbols().await.ok(), Some(vec!["600519".to_string()]));
    }

    fn env_file(name: &str, contents: &str) -> PathBuf {
        let file = format!("watchlist-{}-{}.env", std::process::id(), name);
        let path = std::env::temp_dir().join(file);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn os_list(key: &str) -> Option<String> {
        (key == "STOCK_LIST").then(|| "300750,688981".to_string())
    }

    fn os_unset(_: &str) -> Option<String> {
        None
    }

    #[tokio::test]
    async fn test_env_file_wins_over_process_env() {
        let path = env_file("wins", "TUSHARE_TOKEN=abc\nSTOCK_LIST= 600519, 000858 ,\n");
        let source = EnvWatchlist::with_env_file(&path).with_process_env(os_list);

        assert_eq!(
            source.symbols().await.ok(),
            Some(vec!["600519".to_string(), "000858".to_string()])
        );
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_rereads_env_file_on_each_call() {
        let path = env_file("reread", "STOCK_LIST=600519\n");
        let source = EnvWatchlist::with_env_file(&path).with_process_env(os_unset);
        assert_eq!(source.load().as_slice(), &["600519"]);

        std::fs::write(&path, "STOCK_LIST=000001,300750\n").unwrap();
        assert_eq!(source.load().as_slice(), &["000001", "300750"]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_blank_env_file_value_uses_process_env() {
        let path = env_file("blank", "STOCK_LIST=\n");
        let source = EnvWatchlist::with_env_file(&path).with_process_env(os_list);
        assert_eq!(source.load().as_slice(), &["300750", "688981"]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_env_file_uses_process_env() {
        let file = format!("watchlist-{}-absent.env", std::process::id());
        let path = std::env::temp_dir().join(file);
        let source = EnvWatchlist::with_env_file(path).with_process_env(os_list);
        assert_eq!(source.load().as_slice(), &["300750", "688981"]);
    }

    #[test]
    fn test_nothing_configured_falls_back_to_single_symbol() {
        let source = EnvWatchlist::process_only().with_process_env(os_unset);
        assert_eq!(source.load().as_slice(), &[FALLBACK_SYMBOL]);
    }
}
