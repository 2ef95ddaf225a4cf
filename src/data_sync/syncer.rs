// =============================================================================
// Kline sync — pull closed bars, detect gaps, enqueue precompute work
// =============================================================================
//
// One pass of spec §4.2 steps 1-3 for a single `(symbol, interval_minutes)`
// series. Grounded on `original_source/data/syncer.py`'s cycle shape (last-
// synced query -> fetch -> filter closed bars -> insert -> enqueue), adapted
// to this workspace's finalized `market_data` column names.

use std::sync::Arc;

use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::exchange::ExchangeClient;
use crate::persistence::trace::new_trace_id;

const FETCH_LIMIT: u32 = 1000;

/// Outcome of one sync pass, used to build the cycle's heartbeat payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOutcome {
    pub bars_inserted: u32,
    pub gaps_detected: u32,
}

/// Read the latest `open_time_ms` already stored for `symbol`, or `None` if
/// the series has never been synced.
async fn latest_open_time_ms(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(open_time_ms) FROM market_data WHERE symbol = ? AND interval_minutes = ?",
    )
    .bind(symbol)
    .bind(interval_minutes)
    .fetch_one(pool)
    .await
}

/// Only bars whose `close_time_ms` is already in the past are "closed" and
/// safe to persist — venues sometimes return the still-forming current bar.
fn is_closed(bar: &crate::bar::Bar, now_ms: i64) -> bool {
    bar.close_time_ms < now_ms
}

/// Insert newly-seen bars with `INSERT IGNORE` and enqueue a PENDING
/// precompute task for each. Returns the count actually inserted (a bar
/// already present via a prior partial run is silently skipped).
pub async fn insert_bars_and_enqueue(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
    bars: &[crate::bar::Bar],
) -> Result<u32, sqlx::Error> {
    let mut inserted = 0u32;
    for bar in bars {
        let result = sqlx::query(
            "INSERT IGNORE INTO market_data \
             (symbol, interval_minutes, open_time_ms, close_time_ms, open, high, low, close, volume) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(symbol)
        .bind(interval_minutes)
        .bind(bar.open_time_ms)
        .bind(bar.close_time_ms)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
            let trace_id = new_trace_id();
            sqlx::query(
                "INSERT IGNORE INTO precompute_tasks \
                 (symbol, interval_minutes, open_time_ms, status, try_count, trace_id) \
                 VALUES (?, ?, ?, 'PENDING', 0, ?)",
            )
            .bind(symbol)
            .bind(interval_minutes)
            .bind(bar.open_time_ms)
            .bind(trace_id)
            .execute(pool)
            .await?;
        }
    }
    Ok(inserted)
}

/// Detect `Δ > interval` gaps within a single ascending batch of bars,
/// logging each and returning the count (spec §4.2 step 2 — gap-fill itself
/// is a separate pass over persisted state, see [`crate::data_sync::gapfill`]).
pub fn count_intra_batch_gaps(bars: &[crate::bar::Bar], interval_minutes: i64) -> u32 {
    let interval_ms = interval_minutes * 60_000;
    bars.windows(2)
        .filter(|w| w[1].open_time_ms - w[0].open_time_ms > interval_ms)
        .count() as u32
}

/// One full sync pass for a single symbol: fetch since the last known bar,
/// insert + enqueue, report gaps. Errors are returned to the caller, which
/// per spec §4.2 must log and continue with the next symbol rather than
/// abort the cycle.
pub async fn sync_symbol(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    symbol: &str,
    interval_minutes: i64,
) -> Result<SyncOutcome, anyhow::Error> {
    let last = latest_open_time_ms(pool, symbol, interval_minutes).await?;
    let start_ms = last.map(|ot| ot + interval_minutes * 60_000);

    let mut bars = client
        .fetch_klines(symbol, interval_minutes, FETCH_LIMIT, start_ms)
        .await?;
    bars.sort_by_key(|b| b.open_time_ms);

    let now_ms = crate::time::now_ms();
    bars.retain(|b| is_closed(b, now_ms));

    if bars.is_empty() {
        return Ok(SyncOutcome::default());
    }

    let gaps = count_intra_batch_gaps(&bars, interval_minutes);
    if gaps > 0 {
        warn!(symbol, gaps, "intra-batch gap detected in sync pass");
    }

    let inserted = insert_bars_and_enqueue(pool, symbol, interval_minutes, &bars).await?;

    info!(
        symbol,
        bars_fetched = bars.len(),
        bars_inserted = inserted,
        gaps,
        "sync pass complete"
    );

    Ok(SyncOutcome {
        bars_inserted: inserted,
        gaps_detected: gaps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;

    fn bar(ot: i64) -> Bar {
        Bar {
            open_time_ms: ot,
            close_time_ms: ot + 59_999,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
        }
    }

    #[test]
    fn no_gaps_in_contiguous_series() {
        let bars = vec![bar(0), bar(60_000), bar(120_000)];
        assert_eq!(count_intra_batch_gaps(&bars, 1), 0);
    }

    #[test]
    fn detects_single_gap() {
        let bars = vec![bar(0), bar(60_000), bar(240_000)];
        assert_eq!(count_intra_batch_gaps(&bars, 1), 1);
    }

    #[test]
    fn closed_bar_check() {
        let now = 1_000_000;
        assert!(is_closed(&bar(0), now));
        assert!(!is_closed(
            &Bar {
                close_time_ms: now + 1,
                ..bar(now)
            },
            now
        ));
    }
}
