// =============================================================================
// Emergency exit
// =============================================================================
//
// Spec §4.4.6 + SPEC_FULL.md Open Question #2: `EMERGENCY_EXIT` is read
// once at the top of the tick; every symbol still holding a position at
// that point is closed with `ReasonCode::EmergencyExit`, bypassing both the
// concurrency cap and the signal rule. The flag is cleared only after every
// symbol in the tick has been processed, so a flag flip mid-tick can never
// leave a later symbol in the same tick unprocessed.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::MySqlPool;
use tracing::info;

use crate::enums::ReasonCode;
use crate::error::EngineError;
use crate::exchange::ExchangeClient;
use crate::persistence::config_store;
use crate::strategy::lifecycle::{self, ClosePlan};
use crate::strategy::positions;

pub const EMERGENCY_EXIT_KEY: &str = "EMERGENCY_EXIT";

/// `true` if the emergency-exit flag is set for this tick. Read once at the
/// top of the tick and threaded through — never re-read mid-tick.
pub async fn is_active(pool: &MySqlPool) -> Result<bool, EngineError> {
    config_store::get_bool(pool, EMERGENCY_EXIT_KEY, false).await
}

/// Close every symbol in `symbols` currently holding a position. Errors on
/// one symbol are logged and do not stop the rest — an emergency exit must
/// make a best effort across the whole book. Returns the realized pnl of
/// every fill, for the caller to feed into risk bookkeeping.
pub async fn close_all(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    trace_id: &str,
    symbols: &[String],
    kline_open_time_ms: i64,
) -> Vec<(String, Decimal)> {
    let mut realized = Vec::new();
    for symbol in symbols {
        let snapshot = match positions::latest_position(pool, symbol).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(symbol, error = %e, "emergency exit: failed to load position");
                continue;
            }
        };
        let Some(snapshot) = snapshot else { continue };
        if snapshot.base_qty <= Decimal::ZERO {
            continue;
        }

        let plan = ClosePlan {
            symbol: symbol.clone(),
            qty: snapshot.base_qty,
            reason_code: ReasonCode::EmergencyExit,
            reason: "emergency exit flag set".to_string(),
            kline_open_time_ms,
        };
        match lifecycle::close_long(pool, client, trace_id, &plan, false).await {
            Ok(result) => realized.push((symbol.clone(), result.pnl_usdt.unwrap_or(Decimal::ZERO))),
            Err(e) => tracing::error!(symbol, error = %e, "emergency exit: close failed"),
        }
    }
    realized
}

/// Clear the flag at the end of the tick, once every symbol has been
/// processed, with a `config_audit` row recording why.
pub async fn clear(pool: &MySqlPool, trace_id: &str) -> Result<(), EngineError> {
    config_store::set(
        pool,
        "strategy-engine",
        EMERGENCY_EXIT_KEY,
        "false",
        trace_id,
        ReasonCode::EmergencyExit,
        "cleared at end of tick after processing all symbols",
    )
    .await?;
    info!("emergency exit flag cleared");
    Ok(())
}
