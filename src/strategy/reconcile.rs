// =============================================================================
// Order reconciliation
// =============================================================================
//
// Spec §4.4.7: orders stuck in CREATED/SUBMITTED past `max_age_secs` get
// polled against the venue. A RECONCILED observation event is appended
// regardless of outcome; a terminal event is appended additionally when the
// venue reports one.

use std::sync::Arc;

use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::enums::{OrderEventType, ReasonCode, Side};
use crate::error::EngineError;
use crate::exchange::{ExchangeClient, OrderStatus};
use crate::persistence::{append_order_event, models::OrderEventRow, stuck_orders, OrderEvent};

const MAX_AGE_SECS: i64 = 180;
const MAX_ORDERS_PER_TICK: i64 = 200;

fn parse_side(raw: &str) -> Side {
    if raw == "SELL" {
        Side::Sell
    } else {
        Side::Buy
    }
}

/// Map a venue-reported status to the terminal `OrderEventType` this order
/// should transition to, if any.
fn terminal_event_for(status: &OrderStatus) -> Option<OrderEventType> {
    match status {
        OrderStatus::Filled => Some(OrderEventType::Filled),
        OrderStatus::Canceled | OrderStatus::Expired => Some(OrderEventType::Canceled),
        OrderStatus::Rejected => Some(OrderEventType::Error),
        OrderStatus::Unknown(s) if matches!(s.as_str(), "REJECTED" | "ERROR" | "FAILED") => {
            Some(OrderEventType::Error)
        }
        OrderStatus::Unknown(s) if matches!(s.as_str(), "CANCELED" | "CANCELLED" | "EXPIRED") => {
            Some(OrderEventType::Canceled)
        }
        OrderStatus::Unknown(s) if matches!(s.as_str(), "FILLED" | "CLOSED") => Some(OrderEventType::Filled),
        OrderStatus::New | OrderStatus::PartiallyFilled | OrderStatus::Unknown(_) => None,
    }
}

async fn reconcile_one(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    trace_id: &str,
    order: &OrderEventRow,
) -> Result<(), EngineError> {
    let result = client
        .get_order_status(&order.symbol, &order.client_order_id)
        .await?;

    let side = parse_side(&order.side);
    let terminal = terminal_event_for(&result.status);

    if let Some(event_type) = terminal {
        append_order_event(
            pool,
            OrderEvent {
                trace_id,
                service: "strategy-engine",
                exchange: &order.exchange,
                symbol: &order.symbol,
                client_order_id: &order.client_order_id,
                exchange_order_id: result.exchange_order_id.as_deref(),
                event_type,
                side,
                qty: result.filled_qty,
                price: result.avg_price,
                status: "RECONCILED_TERMINAL",
                reason_code: ReasonCode::Reconcile,
                reason: "reconciliation resolved a stuck order",
                payload: result.raw.clone(),
            },
        )
        .await?;
    }

    append_order_event(
        pool,
        OrderEvent {
            trace_id,
            service: "strategy-engine",
            exchange: &order.exchange,
            symbol: &order.symbol,
            client_order_id: &order.client_order_id,
            exchange_order_id: result.exchange_order_id.as_deref(),
            event_type: OrderEventType::Reconciled,
            side,
            qty: result.filled_qty,
            price: result.avg_price,
            status: "RECONCILED",
            reason_code: ReasonCode::Reconcile,
            reason: "periodic reconciliation sweep",
            payload: result.raw,
        },
    )
    .await
}

/// Sweep up to [`MAX_ORDERS_PER_TICK`] stuck orders. Each order is
/// reconciled independently; a failure on one does not block the rest.
pub async fn sweep(pool: &MySqlPool, client: &Arc<dyn ExchangeClient>, trace_id: &str) -> Result<u32, EngineError> {
    let orders = stuck_orders(pool, MAX_AGE_SECS, MAX_ORDERS_PER_TICK).await?;
    let mut reconciled = 0u32;
    for order in &orders {
        match reconcile_one(pool, client, trace_id, order).await {
            Ok(()) => reconciled += 1,
            Err(e) => warn!(
                symbol = %order.symbol,
                client_order_id = %order.client_order_id,
                error = %e,
                "reconciliation failed for order"
            ),
        }
    }
    if reconciled > 0 {
        info!(reconciled, "reconciliation sweep complete");
    }
    Ok(reconciled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_status_maps_to_filled_event() {
        assert_eq!(terminal_event_for(&OrderStatus::Filled), Some(OrderEventType::Filled));
    }

    #[test]
    fn canceled_status_maps_to_canceled_event() {
        assert_eq!(terminal_event_for(&OrderStatus::Canceled), Some(OrderEventType::Canceled));
    }

    #[test]
    fn rejected_status_maps_to_error_event() {
        assert_eq!(terminal_event_for(&OrderStatus::Rejected), Some(OrderEventType::Error));
    }

    #[test]
    fn new_status_has_no_terminal_event() {
        assert_eq!(terminal_event_for(&OrderStatus::New), None);
    }

    #[test]
    fn unknown_wire_values_are_classified() {
        assert_eq!(
            terminal_event_for(&OrderStatus::Unknown("CLOSED".to_string())),
            Some(OrderEventType::Filled)
        );
        assert_eq!(
            terminal_event_for(&OrderStatus::Unknown("EXPIRED".to_string())),
            Some(OrderEventType::Canceled)
        );
    }
}
