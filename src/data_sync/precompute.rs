// =============================================================================
// Precompute worker — drain PENDING tasks into `market_data_cache` rows
// =============================================================================
//
// Spec §4.2 step 5 + §4.1's warm-up rule. Grounded on `original_source/
// services/data_syncer/main.py`'s `_compute_features_batch`: load enough
// history before the batch to seed every indicator's window, but only
// persist cache rows for the bars the batch actually asked for.
//
// Each task in the batch recomputes its indicators over the trailing
// window ending at that task's bar (`FeatureVector::compute(&bars[..=idx],
// ..)`), rather than carrying incremental indicator state across tasks —
// O(tasks * window), not O(1) amortized per bar. See SPEC_FULL.md §3 for
// why this is a documented deviation, not an oversight: it matches
// `original_source/data/indicators.py`'s own full-batch recompute.

use sqlx::MySqlPool;
use tracing::{error, info};

use crate::bar::Bar;
use crate::indicators::feature_vector::FeatureVector;

const MAX_TASKS_PER_CYCLE: i64 = 800;
const WARMUP_BARS: i64 = 300;
const MAX_ERROR_LEN: usize = 500;

struct Task {
    open_time_ms: i64,
}

async fn fetch_pending_tasks(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
) -> Result<Vec<Task>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT open_time_ms FROM precompute_tasks \
         WHERE symbol = ? AND interval_minutes = ? AND status = 'PENDING' \
         ORDER BY open_time_ms ASC LIMIT ?",
    )
    .bind(symbol)
    .bind(interval_minutes)
    .bind(MAX_TASKS_PER_CYCLE)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(ot,)| Task { open_time_ms: ot }).collect())
}

/// Load every bar up to `max_ot`, including up to `WARMUP_BARS` bars before
/// `min_ot`, in ascending order — exactly the window each indicator needs
/// to have a full history ending at any bar in `[min_ot, max_ot]`.
async fn load_warm_bars(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
    min_ot: i64,
    max_ot: i64,
) -> Result<Vec<Bar>, sqlx::Error> {
    let rows: Vec<(i64, i64, rust_decimal::Decimal, rust_decimal::Decimal, rust_decimal::Decimal, rust_decimal::Decimal, rust_decimal::Decimal)> =
        sqlx::query_as(
            "SELECT open_time_ms, close_time_ms, open, high, low, close, volume \
             FROM market_data \
             WHERE symbol = ? AND interval_minutes = ? AND open_time_ms <= ? \
             ORDER BY open_time_ms DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(interval_minutes)
        .bind(max_ot)
        .bind(WARMUP_BARS + (max_ot - min_ot) / (interval_minutes * 60_000) + 10)
        .fetch_all(pool)
        .await?;

    let mut bars: Vec<Bar> = rows
        .into_iter()
        .map(|(ot, ct, o, h, l, c, v)| Bar::from_decimal(ot, ct, o, h, l, c, v))
        .collect();
    bars.sort_by_key(|b| b.open_time_ms);
    Ok(bars)
}

async fn upsert_cache_row(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
    bar: &Bar,
    fv: &FeatureVector,
) -> Result<(), sqlx::Error> {
    let features_json = serde_json::to_value(fv).unwrap_or(serde_json::Value::Null);
    sqlx::query(
        "INSERT INTO market_data_cache \
         (symbol, interval_minutes, open_time_ms, ema_fast, ema_slow, rsi, features_json) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON DUPLICATE KEY UPDATE \
           ema_fast = VALUES(ema_fast), ema_slow = VALUES(ema_slow), \
           rsi = VALUES(rsi), features_json = VALUES(features_json)",
    )
    .bind(symbol)
    .bind(interval_minutes)
    .bind(bar.open_time_ms)
    .bind(fv.ema_fast)
    .bind(fv.ema_slow)
    .bind(fv.rsi)
    .bind(features_json)
    .execute(pool)
    .await?;
    Ok(())
}

async fn mark_error(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
    open_time_ms: i64,
    err: &str,
) -> Result<(), sqlx::Error> {
    let truncated: String = err.chars().take(MAX_ERROR_LEN).collect();
    sqlx::query(
        "UPDATE precompute_tasks SET status = 'ERROR', try_count = try_count + 1, last_error = ? \
         WHERE symbol = ? AND interval_minutes = ? AND open_time_ms = ?",
    )
    .bind(truncated)
    .bind(symbol)
    .bind(interval_minutes)
    .bind(open_time_ms)
    .execute(pool)
    .await?;
    Ok(())
}

async fn mark_done_up_to(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
    max_ot: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE precompute_tasks SET status = 'DONE' \
         WHERE symbol = ? AND interval_minutes = ? AND status = 'PENDING' AND open_time_ms <= ?",
    )
    .bind(symbol)
    .bind(interval_minutes)
    .bind(max_ot)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Drain up to 800 PENDING tasks for `symbol`, computing and upserting a
/// `market_data_cache` row for each. Tasks whose target bar is missing from
/// `market_data` (should not happen under normal operation, but a gap-fill
/// race can leave a stale task behind) are marked ERROR individually rather
/// than failing the whole batch.
pub async fn drain_pending(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
    ema_fast_period: usize,
    ema_slow_period: usize,
) -> Result<u32, anyhow::Error> {
    let tasks = fetch_pending_tasks(pool, symbol, interval_minutes).await?;
    if tasks.is_empty() {
        return Ok(0);
    }

    let min_ot = tasks.first().unwrap().open_time_ms;
    let max_ot = tasks.last().unwrap().open_time_ms;

    let bars = load_warm_bars(pool, symbol, interval_minutes, min_ot, max_ot).await?;

    let mut done = 0u32;
    let mut highest_processed: Option<i64> = None;

    for task in &tasks {
        let idx = bars.iter().position(|b| b.open_time_ms == task.open_time_ms);
        let Some(idx) = idx else {
            mark_error(
                pool,
                symbol,
                interval_minutes,
                task.open_time_ms,
                "target bar missing from market_data at precompute time",
            )
            .await?;
            error!(symbol, open_time_ms = task.open_time_ms, "precompute task has no matching bar");
            continue;
        };

        let window = &bars[..=idx];
        let fv = FeatureVector::compute(window, ema_fast_period, ema_slow_period);

        match upsert_cache_row(pool, symbol, interval_minutes, &bars[idx], &fv).await {
            Ok(()) => {
                done += 1;
                highest_processed = Some(task.open_time_ms);
            }
            Err(e) => {
                mark_error(pool, symbol, interval_minutes, task.open_time_ms, &e.to_string()).await?;
                error!(symbol, open_time_ms = task.open_time_ms, error = %e, "precompute upsert failed");
            }
        }
    }

    if let Some(max_done) = highest_processed {
        mark_done_up_to(pool, symbol, interval_minutes, max_done).await?;
    }

    info!(symbol, done, total = tasks.len(), "precompute batch drained");
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(i: i64) -> Bar {
        Bar {
            open_time_ms: i * 60_000,
            close_time_ms: i * 60_000 + 59_999,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0 + (i as f64) * 0.01,
            volume: 10.0,
        }
    }

    #[test]
    fn feature_vector_computes_over_window_ending_at_target() {
        let bars: Vec<Bar> = (0..400).map(bar).collect();
        let fv = FeatureVector::compute(&bars[..350], 12, 26);
        assert!(fv.ema_fast.is_some());
        assert!(fv.rsi.is_some());
    }
}
