// =============================================================================
// order_events — append-only, idempotent writer
// =============================================================================
//
// Grounded on `original_source/shared/domain/events.py::append_order_event`:
// a duplicate-key error on the `(exchange, symbol, client_order_id,
// event_type)` unique index is swallowed as success, never propagated.

use rust_decimal::Decimal;
use sqlx::MySqlPool;

use crate::enums::{OrderEventType, ReasonCode, Side};
use crate::error::EngineError;

pub struct OrderEvent<'a> {
    pub trace_id: &'a str,
    pub service: &'a str,
    pub exchange: &'a str,
    pub symbol: &'a str,
    pub client_order_id: &'a str,
    pub exchange_order_id: Option<&'a str>,
    pub event_type: OrderEventType,
    pub side: Side,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub status: &'a str,
    pub reason_code: ReasonCode,
    pub reason: &'a str,
    pub payload: serde_json::Value,
}

/// Append one `order_events` row. Returns `Ok(())` both on a fresh insert
/// and on the idempotent-duplicate case — callers never need to branch on
/// "was this a retry".
pub async fn append_order_event(pool: &MySqlPool, event: OrderEvent<'_>) -> Result<(), EngineError> {
    let result = sqlx::query(
        r#"
        INSERT INTO order_events(
            trace_id, service, exchange, symbol, client_order_id, exchange_order_id,
            event_type, side, qty, price, status, reason_code, reason, payload_json
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.trace_id)
    .bind(event.service)
    .bind(event.exchange)
    .bind(event.symbol)
    .bind(event.client_order_id)
    .bind(event.exchange_order_id)
    .bind(event.event_type.as_str())
    .bind(event.side.as_str())
    .bind(event.qty)
    .bind(event.price)
    .bind(event.status)
    .bind(event.reason_code.as_str())
    .bind(event.reason)
    .bind(sqlx::types::Json(event.payload))
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            let classified = crate::error::classify_sqlx_error(&e, "uq_client_order");
            if classified.is_idempotent_duplicate() {
                Ok(())
            } else {
                Err(classified)
            }
        }
    }
}

/// Fetch the most recent `order_events` row per `(exchange, symbol,
/// client_order_id)` still in CREATED/SUBMITTED and older than `max_age_secs`
/// — the stuck-order candidate set for reconciliation (spec §4.4.7).
pub async fn stuck_orders(
    pool: &MySqlPool,
    max_age_secs: i64,
    limit: i64,
) -> Result<Vec<crate::persistence::models::OrderEventRow>, EngineError> {
    sqlx::query_as::<_, crate::persistence::models::OrderEventRow>(
        r#"
        SELECT e.*
        FROM order_events e
        INNER JOIN (
            SELECT exchange, symbol, client_order_id, MAX(id) AS max_id
            FROM order_events
            WHERE event_type IN ('CREATED', 'SUBMITTED')
            GROUP BY exchange, symbol, client_order_id
        ) latest ON latest.max_id = e.id
        WHERE e.created_at <= (UTC_TIMESTAMP() - INTERVAL ? SECOND)
        ORDER BY e.created_at ASC
        LIMIT ?
        "#,
    )
    .bind(max_age_secs)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| crate::error::classify_sqlx_error(&e, ""))
}
