// =============================================================================
// ExchangeClient — the venue-agnostic capability set
// =============================================================================
//
// `Binance`, `Bybit`, and `Paper` are all just implementations of this trait;
// the strategy engine and data syncer only ever hold a `dyn ExchangeClient`.
// Only `fetch_klines`, `place_market_order`, and `get_order_status` are
// mandatory; the rest have default no-op-ish implementations so a thin venue
// (or the paper client) doesn't have to implement capabilities it lacks.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bar::Bar;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Venue-reported order status, normalized across Binance/Bybit vocabularies.
/// See `crate::strategy::reconcile` for the exact terminal-state mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Unknown(String),
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub client_order_id: String,
    /// Set for SELL (close) orders; maps to `reduceOnly` (Binance) /
    /// `reduceOnly` (Bybit).
    pub reduce_only: bool,
}

/// The result of placing or querying an order — §4.3's `OrderResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub exchange_order_id: Option<String>,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_price: Option<Decimal>,
    pub fee_usdt: Option<Decimal>,
    pub pnl_usdt: Option<Decimal>,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Venue name, used as the `exchange` column value in persisted rows.
    fn name(&self) -> &'static str;

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval_minutes: i64,
        limit: u32,
        start_ms: Option<i64>,
    ) -> Result<Vec<Bar>, EngineError>;

    async fn place_market_order(&self, req: PlaceOrderRequest) -> Result<OrderResult, EngineError>;

    async fn get_order_status(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<OrderResult, EngineError>;

    /// Ensure isolated margin + the requested leverage are set for `symbol`.
    /// Optional: venues/paper mode with no margin-mode concept no-op.
    async fn set_leverage_and_margin_mode(
        &self,
        _symbol: &str,
        _leverage: u32,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// Optional: place a reduce-only stop-market order (used by some
    /// venues' native stop-loss support; this engine primarily enforces
    /// stops itself per §4.4.5, so this is rarely called).
    async fn place_stop_market_order(
        &self,
        _req: PlaceOrderRequest,
        _stop_price: Decimal,
    ) -> Result<OrderResult, EngineError> {
        Err(EngineError::Internal(format!(
            "{} does not support native stop-market orders",
            self.name()
        )))
    }

    /// Optional: cancel a still-open order.
    async fn cancel_order(&self, _symbol: &str, _client_order_id: &str) -> Result<(), EngineError> {
        Ok(())
    }
}
