//! Arbitrage watcher entry point.
//!
//! Bootstrap order matters: configuration and discovery failures are fatal
//! and exit non-zero before any streaming starts. Once the clients are up,
//! runtime errors never terminate the process; only Ctrl-C / SIGTERM does.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use arbwatch::cache::{KalshiPriceCache, PmPriceCache};
use arbwatch::connectors::{KalshiClient, PolymarketClient};
use arbwatch::discovery::{self, DiscoveryClient};
use arbwatch::server::{self, AppState};
use arbwatch::utils::init_telemetry;
use arbwatch::{Config, Engine, Metrics};

/// Bound on the HTTP drain after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: no .env file loaded: {e}");
    }

    init_telemetry();
    info!("starting arbwatch");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        http_addr = %config.http_addr,
        edge_min_ror_pct = config.edge_min_ror_pct,
        title_sim = config.title_sim,
        time_window_h = config.time_window_h,
        pm_chunk = config.pm_chunk,
        "configuration loaded"
    );

    // Bootstrap: fetch both catalogues and build the pair list.
    info!("bootstrapping: fetching markets and creating pairs");
    let discovery_client = DiscoveryClient::new();
    let pm_markets = discovery_client
        .fetch_polymarket_markets()
        .await
        .context("fetch polymarket markets")?;
    let kalshi_markets = discovery_client
        .fetch_kalshi_markets()
        .await
        .context("fetch kalshi markets")?;

    let pairs = discovery::build_pairs(
        &pm_markets,
        &kalshi_markets,
        config.title_sim,
        config.time_window_h,
    );
    let token_ids = discovery::pm_token_ids(&pairs);
    let tickers = discovery::kalshi_tickers(&pairs);
    info!(
        pairs = pairs.len(),
        pm_tokens = token_ids.len(),
        kalshi_tickers = tickers.len(),
        "bootstrap complete"
    );

    let metrics = Arc::new(Metrics::new());
    let pm_cache = Arc::new(PmPriceCache::new());
    let kalshi_cache = Arc::new(KalshiPriceCache::new());
    let cancel = CancellationToken::new();

    let pm_client = PolymarketClient::new(
        token_ids,
        config.pm_chunk,
        pm_cache.clone(),
        metrics.clone(),
        cancel.clone(),
    );
    pm_client.spawn();

    let kalshi_client = KalshiClient::new(
        config.kalshi_key_id.clone(),
        config.kalshi_key_path.clone(),
        kalshi_cache.clone(),
        metrics.clone(),
        cancel.clone(),
    );
    let kalshi_enabled = kalshi_client.is_enabled();
    kalshi_client.spawn();

    let engine = Arc::new(Engine::new(
        pairs,
        pm_cache,
        kalshi_cache,
        kalshi_enabled,
        config.edge_min_ror_pct,
        metrics.clone(),
    ));
    tokio::spawn(engine.clone().run(cancel.clone()));

    let state = AppState { engine, metrics };
    let mut server_task = tokio::spawn(server::serve(
        config.http_addr.clone(),
        state,
        cancel.clone(),
    ));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("install ctrl-c handler")?;
            info!("shutdown signal received");
        }
        res = &mut server_task => {
            cancel.cancel();
            match res {
                Ok(Ok(())) => anyhow::bail!("http server exited unexpectedly"),
                Ok(Err(e)) => return Err(e).context("http server failed"),
                Err(e) => return Err(e).context("http server task panicked"),
            }
        }
    }

    cancel.cancel();

    match tokio::time::timeout(SHUTDOWN_GRACE, server_task).await {
        Ok(Ok(Ok(()))) => info!("shutdown complete"),
        Ok(Ok(Err(e))) => error!(error = %e, "http server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "http server task failed"),
        Err(_) => warn!("shutdown grace period elapsed, exiting"),
    }

    Ok(())
}
