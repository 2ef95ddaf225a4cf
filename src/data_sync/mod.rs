// =============================================================================
// Data syncer — kline pull, gap fill, precompute, archive
// =============================================================================

pub mod archive;
pub mod gapfill;
pub mod precompute;
pub mod syncer;

use std::sync::Arc;

use sqlx::MySqlPool;
use tracing::{error, info, warn};

use crate::exchange::ExchangeClient;

/// One full per-symbol cycle: sync -> gap fill -> precompute -> heartbeat.
/// A failure anywhere in the cycle is logged and swallowed — per spec §4.2,
/// one symbol's trouble must never stall the others.
pub async fn run_symbol_cycle(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    symbol: &str,
    interval_minutes: i64,
    ema_fast_period: usize,
    ema_slow_period: usize,
) {
    match syncer::sync_symbol(pool, client, symbol, interval_minutes).await {
        Ok(outcome) => info!(
            symbol,
            bars_inserted = outcome.bars_inserted,
            gaps = outcome.gaps_detected,
            "sync complete"
        ),
        Err(e) => {
            error!(symbol, error = %e, "sync pass failed, continuing with other symbols");
        }
    }

    if let Err(e) = gapfill::fill_gaps(pool, client, symbol, interval_minutes).await {
        warn!(symbol, error = %e, "gap fill pass failed");
    }

    if let Err(e) = precompute::drain_pending(
        pool,
        symbol,
        interval_minutes,
        ema_fast_period,
        ema_slow_period,
    )
    .await
    {
        error!(symbol, error = %e, "precompute pass failed");
    }
}

/// Build the heartbeat payload for `service_status`: lag between now and
/// the newest cached bar across all configured symbols.
pub async fn data_sync_lag_ms(pool: &MySqlPool, symbols: &[String], interval_minutes: i64) -> i64 {
    let mut newest_cache_ot: Option<i64> = None;
    for symbol in symbols {
        let ot: Option<(Option<i64>,)> = sqlx::query_as(
            "SELECT MAX(open_time_ms) FROM market_data_cache WHERE symbol = ? AND interval_minutes = ?",
        )
        .bind(symbol)
        .bind(interval_minutes)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten();

        if let Some((Some(ot),)) = ot {
            newest_cache_ot = Some(newest_cache_ot.map_or(ot, |cur| cur.max(ot)));
        }
    }

    match newest_cache_ot {
        Some(ot) => (crate::time::now_ms() - ot).max(0),
        None => i64::MAX,
    }
}
