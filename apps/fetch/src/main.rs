mod main_lib;

use main_lib::{build_manager, fetch_watchlist, init_tracing, parse_capability};
use watchlist_market_data::MarketDataConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MarketDataConfig::from_env()?;
    init_tracing();
    config.validate();

    let capability = parse_capability(std::env::args().nth(1).as_deref())?;
    let manager = build_manager(&config)?;
    let watchlist = config.watchlist();

    tracing::info!(
        "Fetching {} for {} symbol(s) with {} worker(s)",
        capability,
        watchlist.len(),
        config.max_workers
    );

    let report = fetch_watchlist(&manager, &watchlist, capability).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
