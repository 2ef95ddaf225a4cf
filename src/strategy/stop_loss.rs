// =============================================================================
// Stop-loss enforcement
// =============================================================================
//
// Spec §4.4.5: runs before signal evaluation and takes precedence over it.
// `stop_price` is read back off the position's `meta_json` (written at open
// time by `lifecycle::open_long`); if it's missing, it's recomputed from
// `avg_entry_price` so an older snapshot row never silently skips its stop.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::MySqlPool;
use tracing::warn;

use crate::enums::ReasonCode;
use crate::error::EngineError;
use crate::exchange::ExchangeClient;
use crate::strategy::lifecycle::{self, ClosePlan};
use crate::strategy::positions;
use crate::strategy::sizing;

fn meta_stop_price(meta: &serde_json::Value, avg_entry_price: Decimal, default_stop_dist_pct: f64) -> Decimal {
    meta.get("stop_price")
        .and_then(|v| v.as_f64())
        .and_then(Decimal::from_f64_retain)
        .unwrap_or_else(|| sizing::stop_price(avg_entry_price, default_stop_dist_pct))
}

/// Check `symbol`'s open position (if any) against its stop price and, if
/// breached, close it with `ReasonCode::StopLoss`. Returns the realized
/// pnl if a close was triggered and filled, `None` otherwise.
pub async fn enforce(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    trace_id: &str,
    symbol: &str,
    last_close: Decimal,
    kline_open_time_ms: i64,
    default_stop_dist_pct: f64,
) -> Result<Option<Decimal>, EngineError> {
    let Some(snapshot) = positions::latest_position(pool, symbol).await? else {
        return Ok(None);
    };
    if snapshot.base_qty <= Decimal::ZERO {
        return Ok(None);
    }

    let stop_price = meta_stop_price(&snapshot.meta_json, snapshot.avg_entry_price, default_stop_dist_pct);
    if last_close > stop_price {
        return Ok(None);
    }

    warn!(symbol, %last_close, %stop_price, "stop loss breached");

    let plan = ClosePlan {
        symbol: symbol.to_string(),
        qty: snapshot.base_qty,
        reason_code: ReasonCode::StopLoss,
        reason: format!("last_close {last_close} <= stop_price {stop_price}"),
        kline_open_time_ms,
    };
    let result = lifecycle::close_long(pool, client, trace_id, &plan, false).await?;
    Ok(Some(result.pnl_usdt.unwrap_or(Decimal::ZERO)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn meta_stop_price_reads_persisted_value() {
        let meta = serde_json::json!({ "stop_price": 97.0 });
        let sp = meta_stop_price(&meta, dec!(100), 0.03);
        assert_eq!(sp, dec!(97));
    }

    #[test]
    fn meta_stop_price_recomputes_when_missing() {
        let meta = serde_json::json!({});
        let sp = meta_stop_price(&meta, dec!(100), 0.03);
        assert_eq!(sp, dec!(97.00));
    }
}
