use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use watchlist_market_data::{
    Capability, FetchRequest, FetcherManager, MarketDataConfig, StaticWatchlist,
};

pub fn init_tracing() {
    let log_format =
        std::env::var("WATCHLIST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// First CLI argument, defaulting to realtime quotes.
pub fn parse_capability(arg: Option<&str>) -> anyhow::Result<Capability> {
    match arg {
        None => Ok(Capability::RealtimeQuote),
        Some(raw) => raw.parse().map_err(|e: String| anyhow::anyhow!(e)),
    }
}

pub fn build_manager(config: &MarketDataConfig) -> anyhow::Result<FetcherManager> {
    let manager = FetcherManager::from_config(config)?;
    if manager.provider_ids().is_empty() {
        anyhow::bail!("No market data providers are enabled");
    }
    tracing::info!("Providers registered: {:?}", manager.provider_ids());
    Ok(manager)
}

/// Fetch one capability for every watchlist symbol.
///
/// Failures are reported per symbol; one bad symbol never aborts the run.
pub async fn fetch_watchlist(
    manager: &FetcherManager,
    watchlist: &StaticWatchlist,
    capability: Capability,
) -> serde_json::Value {
    for symbol in watchlist.unrecognized() {
        tracing::warn!("Unrecognized symbol in watchlist: {}", symbol);
    }

    let requests = watchlist.requests(|symbol| FetchRequest::new(capability, symbol));
    let results = manager.fetch_batch(requests).await;

    let entries: Vec<serde_json::Value> = watchlist
        .as_slice()
        .iter()
        .zip(results)
        .map(|(symbol, result)| match result {
            Ok(result) => serde_json::json!({
                "symbol": symbol,
                "provider": result.provider,
                "fetched_at": result.fetched_at,
                "payload": result.payload,
            }),
            Err(err) => {
                tracing::error!("Failed to fetch {} for {}: {}", capability, symbol, err);
                serde_json::json!({
                    "symbol": symbol,
                    "error": err.to_string(),
                })
            }
        })
        .collect();

    serde_json::json!({
        "capability": capability,
        "results": entries,
    })
}
