// =============================================================================
// Paper client — demo-mode execution with real market data
// =============================================================================
//
// Demo mode still needs real klines to drive the strategy; only the order
// leg is synthetic. `PaperClient` wraps a real `ExchangeClient` for
// `fetch_klines` and fabricates an immediate full fill for everything else,
// the same "Simulated" shape the teacher's demo-mode execution path used.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::bar::Bar;
use crate::error::EngineError;
use crate::exchange::client::{ExchangeClient, OrderResult, OrderStatus, PlaceOrderRequest};

pub struct PaperClient {
    inner: Arc<dyn ExchangeClient>,
    fills: Mutex<Vec<(String, OrderResult)>>,
}

impl PaperClient {
    pub fn new(inner: Arc<dyn ExchangeClient>) -> Self {
        Self {
            inner,
            fills: Mutex::new(Vec::new()),
        }
    }

    fn last_close(bars: &[Bar]) -> Option<Decimal> {
        bars.last().and_then(|b| Decimal::try_from(b.close).ok())
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval_minutes: i64,
        limit: u32,
        start_ms: Option<i64>,
    ) -> Result<Vec<Bar>, EngineError> {
        self.inner.fetch_klines(symbol, interval_minutes, limit, start_ms).await
    }

    async fn place_market_order(&self, req: PlaceOrderRequest) -> Result<OrderResult, EngineError> {
        let bars = self.inner.fetch_klines(&req.symbol, 1, 1, None).await.unwrap_or_default();
        let avg_price = Self::last_close(&bars);

        let sim_order_id = Uuid::new_v4().to_string();
        let result = OrderResult {
            exchange_order_id: Some(sim_order_id.clone()),
            status: OrderStatus::Filled,
            filled_qty: req.qty,
            avg_price,
            fee_usdt: Some(Decimal::ZERO),
            pnl_usdt: Some(Decimal::ZERO),
            raw: json!({"simulated": true, "orderId": sim_order_id}),
        };

        info!(
            symbol = %req.symbol,
            side = %req.side,
            qty = %req.qty,
            client_order_id = %req.client_order_id,
            sim_order_id,
            "paper fill"
        );

        self.fills.lock().push((req.client_order_id, result.clone()));
        Ok(result)
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        client_order_id: &str,
    ) -> Result<OrderResult, EngineError> {
        self.fills
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == client_order_id)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| EngineError::Internal(format!("no paper fill recorded for {client_order_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::client::{OrderSide, PlaceOrderRequest};

    struct StubClient;

    #[async_trait]
    impl ExchangeClient for StubClient {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn fetch_klines(
            &self,
            _symbol: &str,
            _interval_minutes: i64,
            _limit: u32,
            _start_ms: Option<i64>,
        ) -> Result<Vec<Bar>, EngineError> {
            Ok(vec![Bar {
                open_time_ms: 0,
                close_time_ms: 60_000,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 10.0,
            }])
        }

        async fn place_market_order(&self, _req: PlaceOrderRequest) -> Result<OrderResult, EngineError> {
            unreachable!("stub is only used for klines in these tests")
        }

        async fn get_order_status(
            &self,
            _symbol: &str,
            _client_order_id: &str,
        ) -> Result<OrderResult, EngineError> {
            unreachable!("stub is only used for klines in these tests")
        }
    }

    #[tokio::test]
    async fn place_market_order_fills_immediately_at_last_close() {
        let paper = PaperClient::new(Arc::new(StubClient));
        let req = PlaceOrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            qty: Decimal::new(1, 1),
            client_order_id: "open_strat_BTCUSDT_123".to_string(),
            reduce_only: false,
        };

        let result = paper.place_market_order(req).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.avg_price, Some(Decimal::new(1005, 1)));
    }

    #[tokio::test]
    async fn get_order_status_returns_recorded_fill() {
        let paper = PaperClient::new(Arc::new(StubClient));
        let req = PlaceOrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            qty: Decimal::new(1, 1),
            client_order_id: "open_strat_BTCUSDT_456".to_string(),
            reduce_only: false,
        };
        paper.place_market_order(req).await.unwrap();

        let status = paper.get_order_status("BTCUSDT", "open_strat_BTCUSDT_456").await.unwrap();
        assert_eq!(status.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn get_order_status_errors_for_unknown_id() {
        let paper = PaperClient::new(Arc::new(StubClient));
        assert!(paper.get_order_status("BTCUSDT", "missing").await.is_err());
    }
}
