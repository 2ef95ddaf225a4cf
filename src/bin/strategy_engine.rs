// =============================================================================
// strategy-engine — the periodic trading tick
// =============================================================================
//
// Startup/shutdown shape mirrors `data_syncer.rs`; the tick itself is
// wall-clock aligned per `time::next_tick_sleep_seconds`, grounded on
// `original_source/shared/domain/time.py`'s alignment rule.

use std::sync::Arc;
use std::time::Duration;

use perp_engine::config::{Config, Exchange};
use perp_engine::exchange::{BinanceFuturesClient, BybitLinearClient, ExchangeClient, PaperClient};
use perp_engine::persistence::{migrations, pool};
use perp_engine::strategy::online_model::OnlineLogisticRegression;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "strategy-engine";

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

    info!("strategy-engine starting up");

    let config = Config::from_env()?;
    let pool = pool::connect(&config.database_url).await?;
    migrations::run(&pool).await?;

    let client = build_client(&config);

    let mut model = OnlineLogisticRegression::load(&pool, &config.ai_model_key, config.ai_lr, config.ai_l2).await;

    let tick_seconds = config.strategy_tick_seconds as i64;

    let heartbeat_pool = pool.clone();
    let instance_id = config.instance_id.clone();
    tokio::spawn(async move {
        loop {
            let status = serde_json::json!({ "service": "strategy-engine" });
            if let Err(e) = perp_engine::persistence::heartbeat::upsert_service_status(
                &heartbeat_pool,
                SERVICE_NAME,
                &instance_id,
                &status,
            )
            .await
            {
                warn!(error = %e, "heartbeat upsert failed");
            }
            tokio::time::sleep(Duration::from_secs(15)).await;
        }
    });

    loop {
        let sleep_secs = perp_engine::time::next_tick_sleep_seconds(tick_seconds, chrono::Utc::now());
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(sleep_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, exiting");
                return Ok(());
            }
        }

        perp_engine::strategy::run_tick(&pool, &client, &config, &mut model).await;
    }
}
