// =============================================================================
// Order lifecycle state machine
// =============================================================================
//
// Spec §4.4.4. Grounded on the teacher's `execution.rs::execute_demo/
// execute_live` shape (ensure margin mode -> place -> classify result),
// rewired against the append-only `order_events`/`position_snapshots`/
// `trade_logs` tables instead of an in-memory `PositionManager`.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::enums::{OrderEventType, ReasonCode, Side};
use crate::error::EngineError;
use crate::exchange::{ExchangeClient, OrderResult, OrderStatus, PlaceOrderRequest};
use crate::persistence::{append_order_event, make_client_order_id, OrderEvent};
use crate::strategy::positions;

/// Everything needed to open a new long: the candidate's computed sizing
/// plus the feature bundle persisted into the CREATED event payload.
pub struct OpenPlan {
    pub symbol: String,
    pub qty: Decimal,
    pub entry_price: Decimal,
    pub leverage: u32,
    pub stop_dist_pct: f64,
    pub stop_price: Decimal,
    pub robot_score: f64,
    pub ai_prob: Option<f64>,
    pub features_json: serde_json::Value,
    pub kline_open_time_ms: i64,
}

/// Everything needed to close an existing long.
pub struct ClosePlan {
    pub symbol: String,
    pub qty: Decimal,
    pub reason_code: ReasonCode,
    pub reason: String,
    pub kline_open_time_ms: i64,
}

fn reason_code_for_action(plan_reason: ReasonCode) -> &'static str {
    plan_reason.as_str()
}

/// Open a long position per spec §4.4.4 steps 1-6. Returns the filled
/// `OrderResult` on success; errors from the exchange are returned to the
/// caller, which per spec must log and move on to the next symbol.
pub async fn open_long(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    trace_id: &str,
    plan: &OpenPlan,
) -> Result<OrderResult, EngineError> {
    let exchange = client.name();
    let client_order_id =
        make_client_order_id("OPEN", &plan.symbol, plan.kline_open_time_ms, "sb");

    let created_payload = serde_json::json!({
        "features": plan.features_json,
        "robot_score": plan.robot_score,
        "ai_prob": plan.ai_prob,
        "qty": plan.qty,
        "entry_price": plan.entry_price,
        "leverage": plan.leverage,
        "stop_price": plan.stop_price,
        "stop_dist_pct": plan.stop_dist_pct,
    });

    append_order_event(
        pool,
        OrderEvent {
            trace_id,
            service: "strategy-engine",
            exchange,
            symbol: &plan.symbol,
            client_order_id: &client_order_id,
            exchange_order_id: None,
            event_type: OrderEventType::Created,
            side: Side::Buy,
            qty: plan.qty,
            price: Some(plan.entry_price),
            status: "CREATED",
            reason_code: ReasonCode::StrategySignal,
            reason: "setup B buy signal",
            payload: created_payload,
        },
    )
    .await?;

    client
        .set_leverage_and_margin_mode(&plan.symbol, plan.leverage)
        .await?;

    let result = client
        .place_market_order(PlaceOrderRequest {
            symbol: plan.symbol.clone(),
            side: crate::exchange::OrderSide::Buy,
            qty: plan.qty,
            client_order_id: client_order_id.clone(),
            reduce_only: false,
        })
        .await?;

    append_terminal_event(
        pool,
        trace_id,
        exchange,
        &plan.symbol,
        &client_order_id,
        Side::Buy,
        ReasonCode::StrategySignal,
        "setup B buy signal",
        &result,
    )
    .await?;

    if result.status == OrderStatus::Filled {
        let avg_price = result.avg_price.unwrap_or(plan.entry_price);
        let meta = serde_json::json!({
            "stop_dist_pct": plan.stop_dist_pct,
            "stop_price": plan.stop_price,
            "trade_id": client_order_id,
            "leverage": plan.leverage,
            "robot_score": plan.robot_score,
        });
        positions::insert_position_snapshot(pool, &plan.symbol, result.filled_qty, avg_price, meta).await?;

        sqlx::query(
            "INSERT INTO trade_logs \
             (trace_id, symbol, side, qty, leverage, stop_dist_pct, stop_price, client_order_id, \
              exchange_order_id, robot_score, ai_prob, open_reason_code, open_reason, \
              entry_time_ms, entry_price, features_json, status) \
             VALUES (?, ?, 'BUY', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'OPEN')",
        )
        .bind(trace_id)
        .bind(&plan.symbol)
        .bind(result.filled_qty)
        .bind(plan.leverage as i32)
        .bind(Decimal::from_f64_retain(plan.stop_dist_pct).unwrap_or_default())
        .bind(plan.stop_price)
        .bind(&client_order_id)
        .bind(result.exchange_order_id.as_deref())
        .bind(plan.robot_score)
        .bind(plan.ai_prob)
        .bind(ReasonCode::StrategySignal.as_str())
        .bind("setup B buy signal")
        .bind(plan.kline_open_time_ms)
        .bind(avg_price)
        .bind(sqlx::types::Json(plan.features_json.clone()))
        .execute(pool)
        .await
        .map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;

        info!(symbol = %plan.symbol, qty = %result.filled_qty, "position opened");
    }

    Ok(result)
}

/// Close an existing long per spec §4.4.4 step 7 + the close-reason
/// policy. `take_profit_reason_on_positive_pnl` implements the
/// `STRATEGY_EXIT` -> `TAKE_PROFIT` relabeling rule.
pub async fn close_long(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    trace_id: &str,
    plan: &ClosePlan,
    take_profit_reason_on_positive_pnl: bool,
) -> Result<OrderResult, EngineError> {
    let exchange = client.name();
    let client_order_id = make_client_order_id("CLOSE", &plan.symbol, plan.kline_open_time_ms, "sb");

    append_order_event(
        pool,
        OrderEvent {
            trace_id,
            service: "strategy-engine",
            exchange,
            symbol: &plan.symbol,
            client_order_id: &client_order_id,
            exchange_order_id: None,
            event_type: OrderEventType::Created,
            side: Side::Sell,
            qty: plan.qty,
            price: None,
            status: "CREATED",
            reason_code: plan.reason_code,
            reason: &plan.reason,
            payload: serde_json::json!({ "qty": plan.qty }),
        },
    )
    .await?;

    let result = client
        .place_market_order(PlaceOrderRequest {
            symbol: plan.symbol.clone(),
            side: crate::exchange::OrderSide::Sell,
            qty: plan.qty,
            client_order_id: client_order_id.clone(),
            reduce_only: true,
        })
        .await?;

    append_terminal_event(
        pool,
        trace_id,
        exchange,
        &plan.symbol,
        &client_order_id,
        Side::Sell,
        plan.reason_code,
        &plan.reason,
        &result,
    )
    .await?;

    if result.status == OrderStatus::Filled {
        let pnl = result.pnl_usdt.unwrap_or(Decimal::ZERO);
        let final_reason_code = if plan.reason_code == ReasonCode::StrategyExit
            && take_profit_reason_on_positive_pnl
            && pnl > Decimal::ZERO
        {
            ReasonCode::TakeProfit
        } else {
            plan.reason_code
        };

        positions::insert_position_snapshot(
            pool,
            &plan.symbol,
            Decimal::ZERO,
            Decimal::ZERO,
            serde_json::json!({ "closed_via": reason_code_for_action(final_reason_code) }),
        )
        .await?;

        let label: i32 = if pnl > Decimal::ZERO { 1 } else { 0 };
        sqlx::query(
            "UPDATE trade_logs SET status = 'CLOSED', exit_price = ?, pnl = ?, exit_time_ms = ?, \
             close_reason_code = ?, close_reason = ?, label = ?, exchange_order_id = COALESCE(?, exchange_order_id) \
             WHERE symbol = ? AND status = 'OPEN' ORDER BY id DESC LIMIT 1",
        )
        .bind(result.avg_price)
        .bind(pnl)
        .bind(plan.kline_open_time_ms)
        .bind(final_reason_code.as_str())
        .bind(&plan.reason)
        .bind(label)
        .bind(result.exchange_order_id.as_deref())
        .bind(&plan.symbol)
        .execute(pool)
        .await
        .map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;

        info!(symbol = %plan.symbol, pnl = %pnl, reason = %final_reason_code, "position closed");
    } else {
        warn!(symbol = %plan.symbol, status = ?result.status, "close order did not fill immediately");
    }

    Ok(result)
}

#[allow(clippy::too_many_arguments)]
async fn append_terminal_event(
    pool: &MySqlPool,
    trace_id: &str,
    exchange: &str,
    symbol: &str,
    client_order_id: &str,
    side: Side,
    reason_code: ReasonCode,
    reason: &str,
    result: &OrderResult,
) -> Result<(), EngineError> {
    let event_type = if result.status == OrderStatus::Filled {
        OrderEventType::Filled
    } else {
        OrderEventType::Submitted
    };
    let status = status_wire_value(&result.status);

    append_order_event(
        pool,
        OrderEvent {
            trace_id,
            service: "strategy-engine",
            exchange,
            symbol,
            client_order_id,
            exchange_order_id: result.exchange_order_id.as_deref(),
            event_type,
            side,
            qty: result.filled_qty,
            price: result.avg_price,
            status: &status,
            reason_code,
            reason,
            payload: result.raw.clone(),
        },
    )
    .await
}

fn status_wire_value(status: &OrderStatus) -> String {
    match status {
        OrderStatus::New => "NEW".to_string(),
        OrderStatus::PartiallyFilled => "PARTIALLY_FILLED".to_string(),
        OrderStatus::Filled => "FILLED".to_string(),
        OrderStatus::Canceled => "CANCELED".to_string(),
        OrderStatus::Rejected => "REJECTED".to_string(),
        OrderStatus::Expired => "EXPIRED".to_string(),
        OrderStatus::Unknown(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_code_for_action_matches_wire_value() {
        assert_eq!(reason_code_for_action(ReasonCode::StopLoss), "STOP_LOSS");
    }
}
