// =============================================================================
// Gap fill — close holes in the last ~600 persisted rows
// =============================================================================
//
// Spec §4.2 step 4. A gap can appear when a cycle is missed (process
// restart, venue outage): the sync pass only ever asks for bars after the
// latest stored `open_time_ms`, so a hole in the middle of the series is
// invisible to it. This pass scans the tail of persisted history and
// re-fetches each missing window explicitly.

use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::data_sync::syncer::insert_bars_and_enqueue;
use crate::exchange::ExchangeClient;

const SCAN_ROWS: i64 = 600;
const CHUNK_LIMIT: u32 = 1000;

struct Gap {
    start_ms: i64,
    end_ms: i64,
}

async fn find_gaps(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
) -> Result<Vec<Gap>, sqlx::Error> {
    let interval_ms = interval_minutes * 60_000;
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT open_time_ms FROM market_data \
         WHERE symbol = ? AND interval_minutes = ? \
         ORDER BY open_time_ms DESC LIMIT ?",
    )
    .bind(symbol)
    .bind(interval_minutes)
    .bind(SCAN_ROWS)
    .fetch_all(pool)
    .await?;

    let mut ots: Vec<i64> = rows.into_iter().map(|(ot,)| ot).collect();
    ots.sort_unstable();

    let mut gaps = Vec::new();
    for w in ots.windows(2) {
        let (prev, next) = (w[0], w[1]);
        if next - prev > interval_ms {
            gaps.push(Gap {
                start_ms: prev + interval_ms,
                end_ms: next - interval_ms,
            });
        }
    }
    Ok(gaps)
}

/// Fetch and insert bars for every gap found in the scan window, chunked at
/// `CHUNK_LIMIT` bars per request, stopping a given gap early if the venue
/// returns no more data (a genuine hole the venue itself can't fill).
pub async fn fill_gaps(
    pool: &MySqlPool,
    client: &std::sync::Arc<dyn ExchangeClient>,
    symbol: &str,
    interval_minutes: i64,
) -> Result<u32, anyhow::Error> {
    let gaps = find_gaps(pool, symbol, interval_minutes).await?;
    if gaps.is_empty() {
        return Ok(0);
    }

    let mut total_filled = 0u32;
    for gap in gaps {
        let mut cursor = gap.start_ms;
        loop {
            if cursor > gap.end_ms {
                break;
            }
            let bars = client
                .fetch_klines(symbol, interval_minutes, CHUNK_LIMIT, Some(cursor))
                .await?;
            if bars.is_empty() {
                warn!(symbol, cursor, "gap fill: venue returned no data, leaving window open");
                break;
            }
            let mut bars = bars;
            bars.sort_by_key(|b| b.open_time_ms);
            bars.retain(|b| b.open_time_ms <= gap.end_ms);

            let inserted = insert_bars_and_enqueue(pool, symbol, interval_minutes, &bars).await?;
            total_filled += inserted;

            match bars.last() {
                Some(last) => cursor = last.open_time_ms + interval_minutes * 60_000,
                None => break,
            }
        }
    }

    if total_filled > 0 {
        info!(symbol, total_filled, "gap fill closed missing windows");
    }
    Ok(total_filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_struct_computes_inclusive_bounds() {
        let interval_ms = 60_000;
        let (prev, next) = (0i64, 300_000i64);
        let gap = Gap {
            start_ms: prev + interval_ms,
            end_ms: next - interval_ms,
        };
        assert_eq!(gap.start_ms, 60_000);
        assert_eq!(gap.end_ms, 240_000);
    }
}
