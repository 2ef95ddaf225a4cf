// =============================================================================
// Position/trade lookups — append-only tables, "current" is the latest row
// =============================================================================
//
// Spec §3: `position_snapshots` and `trade_logs` are append-only; "current
// position" for a symbol is its latest `position_snapshots` row, and the
// open trade is the latest `trade_logs` row with `status = OPEN`.

use rust_decimal::Decimal;
use sqlx::MySqlPool;

use crate::error::EngineError;
use crate::persistence::models::{PositionSnapshotRow, TradeLogRow};

pub async fn latest_position(
    pool: &MySqlPool,
    symbol: &str,
) -> Result<Option<PositionSnapshotRow>, EngineError> {
    sqlx::query_as::<_, PositionSnapshotRow>(
        "SELECT * FROM position_snapshots WHERE symbol = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(|e| crate::error::classify_sqlx_error(&e, ""))
}

pub async fn open_trade(pool: &MySqlPool, symbol: &str) -> Result<Option<TradeLogRow>, EngineError> {
    sqlx::query_as::<_, TradeLogRow>(
        "SELECT * FROM trade_logs WHERE symbol = ? AND status = 'OPEN' ORDER BY id DESC LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(|e| crate::error::classify_sqlx_error(&e, ""))
}

/// Count of symbols currently holding a position (`base_qty > 0` in their
/// latest snapshot) among `symbols`.
pub async fn open_count(pool: &MySqlPool, symbols: &[String]) -> Result<u32, EngineError> {
    let mut count = 0u32;
    for symbol in symbols {
        if let Some(snap) = latest_position(pool, symbol).await? {
            if snap.base_qty > Decimal::ZERO {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Most recently closed trade for `symbol` — the row [`train_on_closed_trade`]
/// learns from right after a close.
pub async fn last_closed_trade(pool: &MySqlPool, symbol: &str) -> Result<Option<TradeLogRow>, EngineError> {
    sqlx::query_as::<_, TradeLogRow>(
        "SELECT * FROM trade_logs WHERE symbol = ? AND status = 'CLOSED' ORDER BY id DESC LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .map_err(|e| crate::error::classify_sqlx_error(&e, ""))
}

pub async fn insert_position_snapshot(
    pool: &MySqlPool,
    symbol: &str,
    base_qty: Decimal,
    avg_entry_price: Decimal,
    meta: serde_json::Value,
) -> Result<(), EngineError> {
    sqlx::query(
        "INSERT INTO position_snapshots (symbol, base_qty, avg_entry_price, meta_json) VALUES (?, ?, ?, ?)",
    )
    .bind(symbol)
    .bind(base_qty)
    .bind(avg_entry_price)
    .bind(sqlx::types::Json(meta))
    .execute(pool)
    .await
    .map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;
    Ok(())
}
