// =============================================================================
// Bybit V5 linear (USDT perpetual) REST client — HMAC-SHA256 signed requests
// =============================================================================
//
// Bybit V5 signs `timestamp + api_key + recv_window + payload`, where
// `payload` must be the **exact bytes sent on the wire** — the sorted query
// string for GET, the exact JSON body bytes for POST. Re-serializing the
// body after signing (even reordering keys) invalidates the signature
// (`retCode=10004`). This client signs from the same string it transmits:
// GET builds one sorted query string used both for the signature and the
// URL; POST builds one compact JSON string used both for the signature and
// the raw request body.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::bar::Bar;
use crate::error::EngineError;
use crate::exchange::client::{ExchangeClient, OrderResult, OrderSide, OrderStatus, PlaceOrderRequest};
use crate::exchange::rate_limit::RateLimiter;

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW_MS: u64 = 5000;
const ORDER_POLL_TIMEOUT: Duration = Duration::from_secs(10);
const ORDER_POLL_INTERVAL: Duration = Duration::from_millis(400);

fn bybit_status(s: &str) -> OrderStatus {
    match s.to_ascii_lowercase().as_str() {
        "new" | "created" => OrderStatus::New,
        "partiallyfilled" | "partialfilled" => OrderStatus::PartiallyFilled,
        "filled" => OrderStatus::Filled,
        "cancelled" | "canceled" | "pendingcancel" => OrderStatus::Canceled,
        "rejected" => OrderStatus::Rejected,
        "deactivated" | "triggered" => OrderStatus::Expired,
        other => OrderStatus::Unknown(other.to_string()),
    }
}

pub struct BybitLinearClient {
    api_key: String,
    secret: String,
    base_url: String,
    leverage: u32,
    position_idx: u32,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    prepared_symbols: Mutex<HashSet<String>>,
}

impl BybitLinearClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, leverage: u32, position_idx: u32) -> Self {
        Self::with_base_url(api_key, secret, "https://api.bybit.com", leverage, position_idx)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
        leverage: u32,
        position_idx: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: base_url.into(),
            leverage,
            position_idx,
            client,
            limiter: Arc::new(RateLimiter::bybit_defaults()),
            prepared_symbols: Mutex::new(HashSet::new()),
        }
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn sign(&self, payload: &str, ts_ms: u64) -> String {
        let prehash = format!("{ts_ms}{}{RECV_WINDOW_MS}{payload}", self.api_key);
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(prehash.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn get_signed(
        &self,
        path: &str,
        mut params: Vec<(&str, String)>,
        budget: &str,
    ) -> Result<serde_json::Value, EngineError> {
        if self.api_key.is_empty() || self.secret.is_empty() {
            return Err(EngineError::Auth("missing Bybit API key/secret".into()));
        }
        self.limiter.acquire(budget, 1).await;

        params.sort_by(|a, b| a.0.cmp(b.0));
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let ts = Self::now_ms();
        let sig = self.sign(&query, ts);
        let url = format!("{}{}?{}", self.base_url, path, query);

        let resp = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", ts.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("X-BAPI-SIGN", sig)
            .send()
            .await
            .map_err(|e| EngineError::Temporary(format!("{path} request failed: {e}")))?;

        self.finish_response(resp, budget).await
    }

    async fn get_public(&self, path: &str, query: &str, budget: &str) -> Result<serde_json::Value, EngineError> {
        self.limiter.acquire(budget, 1).await;
        let url = format!("{}{}?{}", self.base_url, path, query);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Temporary(format!("{path} request failed: {e}")))?;
        self.finish_response(resp, budget).await
    }

    async fn post_signed(
        &self,
        path: &str,
        body: &serde_json::Value,
        budget: &str,
    ) -> Result<serde_json::Value, EngineError> {
        if self.api_key.is_empty() || self.secret.is_empty() {
            return Err(EngineError::Auth("missing Bybit API key/secret".into()));
        }
        self.limiter.acquire(budget, 1).await;

        // Compact, key-order-preserving serialization — this exact string is
        // both what we sign and what we send.
        let payload = serde_json::to_string(body)
            .map_err(|e| EngineError::Internal(format!("failed to serialize {path} body: {e}")))?;

        let ts = Self::now_ms();
        let sig = self.sign(&payload, ts);
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .post(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", ts.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("X-BAPI-SIGN", sig)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| EngineError::Temporary(format!("{path} request failed: {e}")))?;

        self.finish_response(resp, budget).await
    }

    async fn finish_response(
        &self,
        resp: reqwest::Response,
        budget: &str,
    ) -> Result<serde_json::Value, EngineError> {
        let status = resp.status();
        if status.as_u16() == 429 {
            self.limiter.handle_429(None);
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(EngineError::Auth(format!("bybit returned {status}")));
        }
        if status.is_server_error() {
            return Err(EngineError::Temporary(format!("bybit returned {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EngineError::Internal(format!("failed to parse bybit response: {e}")))?;

        if status.as_u16() >= 400 {
            return Err(EngineError::Exchange(body.to_string()));
        }

        if let Some(ret_code) = body.get("retCode").and_then(|v| v.as_i64()) {
            if ret_code != 0 {
                let msg = body.get("retMsg").and_then(|v| v.as_str()).unwrap_or("");
                return Err(EngineError::Exchange(format!("{msg} (retCode={ret_code})")));
            }
        }

        self.limiter.reset_backoff();
        let _ = budget;
        Ok(body)
    }

    /// Margin mode doesn't change per trade, so it's switched once per
    /// symbol and cached; best-effort, since an account/symbol that rejects
    /// this (already isolated, unsupported pair) must not block trading.
    async fn ensure_isolated_margin(&self, symbol: &str, leverage: u32) -> Result<(), EngineError> {
        if self.prepared_symbols.lock().contains(symbol) {
            return Ok(());
        }

        let body = json!({
            "category": "linear",
            "symbol": symbol,
            "tradeMode": 1,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        let _ = self.post_signed("/v5/position/switch-isolated", &body, "account").await;

        self.prepared_symbols.lock().insert(symbol.to_string());
        Ok(())
    }

    /// Leverage is per-candidate (spec §4.4.3) and must be (re-)applied on
    /// every call, not cached — unlike margin mode it can legitimately
    /// differ between two opens of the same symbol.
    async fn apply_leverage(&self, symbol: &str, leverage: u32) -> Result<(), EngineError> {
        let body = json!({
            "category": "linear",
            "symbol": symbol,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        let _ = self.post_signed("/v5/position/set-leverage", &body, "account").await;
        Ok(())
    }

    async fn fetch_closed_pnl(&self, symbol: &str, order_id: &str) -> Option<Decimal> {
        let deadline = tokio::time::Instant::now() + ORDER_POLL_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            let data = self
                .get_signed(
                    "/v5/position/closed-pnl",
                    vec![
                        ("category", "linear".to_string()),
                        ("symbol", symbol.to_string()),
                        ("orderId", order_id.to_string()),
                    ],
                    "account",
                )
                .await
                .ok()?;

            let rows = data
                .get("result")
                .and_then(|r| r.get("list"))
                .and_then(|l| l.as_array());
            if let Some(rows) = rows {
                if let Some(row) = rows.first() {
                    if let Some(v) = row.get("closedPnl").and_then(|v| v.as_str()) {
                        return v.parse::<Decimal>().ok();
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        None
    }
}

#[async_trait]
impl ExchangeClient for BybitLinearClient {
    fn name(&self) -> &'static str {
        "bybit"
    }

    #[instrument(skip(self), name = "bybit::fetch_klines")]
    async fn fetch_klines(
        &self,
        symbol: &str,
        interval_minutes: i64,
        limit: u32,
        start_ms: Option<i64>,
    ) -> Result<Vec<Bar>, EngineError> {
        let mut query = format!(
            "category=linear&symbol={symbol}&interval={interval_minutes}&limit={limit}"
        );
        if let Some(start) = start_ms {
            query.push_str(&format!("&start={start}"));
        }

        let data = self.get_public("/v5/market/kline", &query, "market_data").await?;
        let rows = data
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(|l| l.as_array())
            .ok_or_else(|| EngineError::Internal("kline response missing result.list".into()))?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            let arr = row
                .as_array()
                .ok_or_else(|| EngineError::Internal("kline row is not an array".into()))?;
            if arr.len() < 6 {
                warn!(len = arr.len(), "skipping malformed kline row");
                continue;
            }
            let open_time_ms = parse_i64(&arr[0])?;
            bars.push(Bar {
                open_time_ms,
                close_time_ms: open_time_ms + interval_minutes * 60_000,
                open: parse_f64(&arr[1])?,
                high: parse_f64(&arr[2])?,
                low: parse_f64(&arr[3])?,
                close: parse_f64(&arr[4])?,
                volume: parse_f64(&arr[5])?,
            });
        }

        // Bybit returns newest-first; this engine consumes ascending series.
        bars.sort_by_key(|b| b.open_time_ms);
        debug!(symbol, count = bars.len(), "klines fetched");
        Ok(bars)
    }

    #[instrument(skip(self, req), name = "bybit::place_market_order")]
    async fn place_market_order(&self, req: PlaceOrderRequest) -> Result<OrderResult, EngineError> {
        self.ensure_isolated_margin(&req.symbol, self.leverage).await?;

        let side = match req.side {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        };
        let mut body = json!({
            "category": "linear",
            "symbol": req.symbol,
            "side": side,
            "orderType": "Market",
            "qty": req.qty.normalize().to_string(),
            "timeInForce": "GTC",
            "orderLinkId": req.client_order_id,
            "positionIdx": self.position_idx,
        });
        if req.reduce_only {
            body["reduceOnly"] = json!(true);
        }

        let data = self.post_signed("/v5/order/create", &body, "order").await?;
        let order_id = data
            .get("result")
            .and_then(|r| r.get("orderId"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let mut status = OrderStatus::New;
        let mut filled_qty = Decimal::ZERO;
        let mut avg_price = None;

        if let Some(order_id) = &order_id {
            let deadline = tokio::time::Instant::now() + ORDER_POLL_TIMEOUT;
            while tokio::time::Instant::now() < deadline {
                let polled = self.get_order_status(&req.symbol, &req.client_order_id).await?;
                status = polled.status.clone();
                filled_qty = polled.filled_qty;
                avg_price = polled.avg_price;
                if status.is_terminal() {
                    break;
                }
                tokio::time::sleep(ORDER_POLL_INTERVAL).await;
            }

            let pnl_usdt = if matches!(req.side, OrderSide::Sell) {
                self.fetch_closed_pnl(&req.symbol, order_id).await
            } else {
                Some(Decimal::ZERO)
            };

            return Ok(OrderResult {
                exchange_order_id: Some(order_id.clone()),
                status,
                filled_qty,
                avg_price,
                fee_usdt: None,
                pnl_usdt,
                raw: data,
            });
        }

        Ok(OrderResult {
            exchange_order_id: None,
            status,
            filled_qty,
            avg_price,
            fee_usdt: None,
            pnl_usdt: None,
            raw: data,
        })
    }

    #[instrument(skip(self), name = "bybit::get_order_status")]
    async fn get_order_status(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<OrderResult, EngineError> {
        let data = self
            .get_signed(
                "/v5/order/realtime",
                vec![
                    ("category", "linear".to_string()),
                    ("symbol", symbol.to_string()),
                    ("orderLinkId", client_order_id.to_string()),
                ],
                "account",
            )
            .await?;

        let row = data
            .get("result")
            .and_then(|r| r.get("list"))
            .and_then(|l| l.as_array())
            .and_then(|a| a.first());

        let Some(row) = row else {
            return Ok(OrderResult {
                exchange_order_id: None,
                status: OrderStatus::Unknown("no-such-order".to_string()),
                filled_qty: Decimal::ZERO,
                avg_price: None,
                fee_usdt: None,
                pnl_usdt: None,
                raw: data,
            });
        };

        Ok(OrderResult {
            exchange_order_id: row.get("orderId").and_then(|v| v.as_str()).map(|s| s.to_string()),
            status: bybit_status(row.get("orderStatus").and_then(|v| v.as_str()).unwrap_or("")),
            filled_qty: row
                .get("cumExecQty")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Decimal>().ok())
                .unwrap_or(Decimal::ZERO),
            avg_price: row
                .get("avgPrice")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Decimal>().ok())
                .filter(|d| !d.is_zero()),
            fee_usdt: None,
            pnl_usdt: None,
            raw: row.clone(),
        })
    }

    async fn set_leverage_and_margin_mode(&self, symbol: &str, leverage: u32) -> Result<(), EngineError> {
        self.ensure_isolated_margin(symbol, leverage).await?;
        self.apply_leverage(symbol, leverage).await
    }

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<(), EngineError> {
        let body = json!({
            "category": "linear",
            "symbol": symbol,
            "orderLinkId": client_order_id,
        });
        self.post_signed("/v5/order/cancel", &body, "order").await?;
        Ok(())
    }
}

fn parse_f64(val: &serde_json::Value) -> Result<f64, EngineError> {
    val.as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| val.as_f64())
        .ok_or_else(|| EngineError::Internal(format!("expected numeric value, got: {val}")))
}

fn parse_i64(val: &serde_json::Value) -> Result<i64, EngineError> {
    val.as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .or_else(|| val.as_i64())
        .ok_or_else(|| EngineError::Internal(format!("expected integer value, got: {val}")))
}

impl std::fmt::Debug for BybitLinearClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitLinearClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("leverage", &self.leverage)
            .field("position_idx", &self.position_idx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_case_insensitive() {
        assert_eq!(bybit_status("Filled"), OrderStatus::Filled);
        assert_eq!(bybit_status("PartiallyFilled"), OrderStatus::PartiallyFilled);
        assert_eq!(bybit_status("Cancelled"), OrderStatus::Canceled);
        assert_eq!(bybit_status("Rejected"), OrderStatus::Rejected);
    }

    #[test]
    fn signature_is_deterministic_for_same_payload() {
        let client = BybitLinearClient::new("key", "secret", 10, 0);
        let a = client.sign("payload", 1_700_000_000_000);
        let b = client.sign("payload", 1_700_000_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_payload() {
        let client = BybitLinearClient::new("key", "secret", 10, 0);
        let a = client.sign("payload-a", 1_700_000_000_000);
        let b = client.sign("payload-b", 1_700_000_000_000);
        assert_ne!(a, b);
    }
}
