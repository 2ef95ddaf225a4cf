// =============================================================================
// data-syncer — per-symbol REST poll loop
// =============================================================================
//
// Startup, shutdown, and per-symbol task-spawn shape grounded on the
// teacher's `main.rs` (per-symbol `tokio::spawn` loops, reconnect-on-error)
// adapted from websocket streams to a fixed-interval REST poll, and on
// `other_examples/8e717ccc_N0tT1m-invest-iq_...`'s startup connectivity
// check + graceful-shutdown `tokio::select!`.

use std::sync::Arc;
use std::time::Duration;

use perp_engine::config::{Config, Exchange};
use perp_engine::exchange::{BinanceFuturesClient, BybitLinearClient, ExchangeClient, PaperClient};
use perp_engine::persistence::{migrations, pool};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "data-syncer";

fn build_client(config: &Config) -> Arc<dyn ExchangeClient> {
    match config.exchange {
        Exchange::Binance => Arc::new(BinanceFuturesClient::with_base_url(
            config.binance_api_key.clone(),
            config.binance_api_secret.clone(),
            config.binance_base_url.clone(),
            config.futures_leverage,
        )),
        Exchange::Bybit => Arc::new(BybitLinearClient::with_base_url(
            config.bybit_api_key.clone(),
            config.bybit_api_secret.clone(),
            config.bybit_base_url.clone(),
            config.futures_leverage,
            config.bybit_position_idx,
        )),
        Exchange::Paper => {
            let inner: Arc<dyn ExchangeClient> = Arc::new(BinanceFuturesClient::with_base_url(
                config.binance_api_key.clone(),
                config.binance_api_secret.clone(),
                config.binance_base_url.clone(),
                config.futures_leverage,
            ));
            Arc::new(PaperClient::new(inner))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("data-syncer starting up");

    let config = Config::from_env()?;
    let pool = pool::connect(&config.database_url).await?;
    migrations::run(&pool).await?;

    let client = build_client(&config);
    let interval_minutes = config.interval_minutes;
    let ema_fast_period = config.ema_fast_period;
    let ema_slow_period = config.ema_slow_period;
    let cycle_seconds = (interval_minutes.max(1) as u64 * 60).min(60);

    info!(symbols = ?config.symbols, interval_minutes, "launching per-symbol sync loops");

    let mut handles = Vec::new();
    for symbol in config.symbols.clone() {
        let pool = pool.clone();
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            loop {
                perp_engine::data_sync::run_symbol_cycle(
                    &pool,
                    &client,
                    &symbol,
                    interval_minutes,
                    ema_fast_period,
                    ema_slow_period,
                )
                .await;
                tokio::time::sleep(Duration::from_secs(cycle_seconds)).await;
            }
        }));
    }

    let heartbeat_pool = pool.clone();
    let heartbeat_symbols = config.symbols.clone();
    let instance_id = config.instance_id.clone();
    tokio::spawn(async move {
        loop {
            let lag_ms =
                perp_engine::data_sync::data_sync_lag_ms(&heartbeat_pool, &heartbeat_symbols, interval_minutes)
                    .await;
            let status = serde_json::json!({ "data_sync_lag_ms": lag_ms });
            if let Err(e) =
                perp_engine::persistence::heartbeat::upsert_service_status(&heartbeat_pool, SERVICE_NAME, &instance_id, &status)
                    .await
            {
                warn!(error = %e, "heartbeat upsert failed");
            }

            if let Err(e) = perp_engine::data_sync::archive::run_if_due(&heartbeat_pool, chrono::Utc::now()).await {
                error!(error = %e, "daily archive pass failed");
            }

            tokio::time::sleep(Duration::from_secs(15)).await;
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, exiting");
        }
    }

    Ok(())
}
