// =============================================================================
// Binance USDT-M Futures REST client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: the secret key is never logged or serialized. Every signed
// request carries `timestamp` + `recvWindow` in the canonical query string
// and an `X-MBX-APIKEY` header.
//
// Isolated margin + leverage are set once per symbol on first use and then
// cached in `prepared_symbols`; benign "already set" errors are ignored.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::bar::Bar;
use crate::error::EngineError;
use crate::exchange::client::{ExchangeClient, OrderResult, OrderSide, OrderStatus, PlaceOrderRequest};
use crate::exchange::rate_limit::RateLimiter;

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW_MS: u64 = 5000;
const ORDER_POLL_TIMEOUT: Duration = Duration::from_secs(10);
const ORDER_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn interval_minutes_to_binance(minutes: i64) -> Result<&'static str, EngineError> {
    Ok(match minutes {
        1 => "1m",
        3 => "3m",
        5 => "5m",
        15 => "15m",
        30 => "30m",
        60 => "1h",
        120 => "2h",
        240 => "4h",
        360 => "6h",
        480 => "8h",
        720 => "12h",
        1440 => "1d",
        other => {
            return Err(EngineError::Internal(format!(
                "unsupported interval_minutes={other}"
            )))
        }
    })
}

fn binance_status(s: &str) -> OrderStatus {
    match s {
        "NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "CANCELLED" => OrderStatus::Canceled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" => OrderStatus::Expired,
        other => OrderStatus::Unknown(other.to_string()),
    }
}

pub struct BinanceFuturesClient {
    api_key: String,
    secret: String,
    base_url: String,
    leverage: u32,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    prepared_symbols: Mutex<HashSet<String>>,
}

impl BinanceFuturesClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, leverage: u32) -> Self {
        Self::with_base_url(api_key, secret, "https://fapi.binance.com", leverage)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
        leverage: u32,
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
            client,
            limiter: Arc::new(RateLimiter::binance_defaults()),
            prepared_symbols: Mutex::new(HashSet::new()),
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    /// Build a signed query string: params sorted, then
    /// `timestamp`/`recvWindow`/`signature` appended in that order.
    fn signed_query(&self, mut params: Vec<(String, String)>) -> String {
        let ts = Self::timestamp_ms();
        params.push(("timestamp".to_string(), ts.to_string()));
        params.push(("recvWindow".to_string(), RECV_WINDOW_MS.to_string()));
        params.sort_by(|a, b| a.0.cmp(&b.0));

        let base = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    async fn request_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        params: Vec<(String, String)>,
        budget: &str,
    ) -> Result<serde_json::Value, EngineError> {
        if self.api_key.is_empty() || self.secret.is_empty() {
            return Err(EngineError::Auth("missing Binance API key/secret".into()));
        }

        self.limiter.acquire(budget, 1).await;
        let qs = self.signed_query(params);
        let url = format!("{}{}?{}", self.base_url, path, qs);

        let resp = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Temporary(format!("{path} timed out: {e}"))
                } else {
                    EngineError::Temporary(format!("{path} request failed: {e}"))
                }
            })?;

        self.handle_headers_and_status(&resp, budget)?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EngineError::Internal(format!("failed to parse {path} response: {e}")))?;

        if status.is_success() {
            self.limiter.reset_backoff();
            Ok(body)
        } else {
            Err(self.classify_error_status(status, &body))
        }
    }

    async fn request_public(
        &self,
        path: &str,
        query: &str,
        budget: &str,
    ) -> Result<serde_json::Value, EngineError> {
        self.limiter.acquire(budget, 1).await;
        let url = format!("{}{}?{}", self.base_url, path, query);

        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Temporary(format!("{path} timed out: {e}"))
            } else {
                EngineError::Temporary(format!("{path} request failed: {e}"))
            }
        })?;

        self.handle_headers_and_status(&resp, budget)?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EngineError::Internal(format!("failed to parse {path} response: {e}")))?;

        if status.is_success() {
            self.limiter.reset_backoff();
            Ok(body)
        } else {
            Err(self.classify_error_status(status, &body))
        }
    }

    fn handle_headers_and_status(
        &self,
        resp: &reqwest::Response,
        budget: &str,
    ) -> Result<(), EngineError> {
        if let Some(val) = resp.headers().get("x-mbx-used-weight-1m") {
            if let Ok(s) = val.to_str() {
                if let Ok(w) = s.parse::<u32>() {
                    self.limiter.update_from_headers(budget, w);
                }
            }
        }

        let status = resp.status();
        if status.as_u16() == 429 || status.as_u16() == 418 {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            self.limiter.handle_429(retry_after);
        }
        Ok(())
    }

    fn classify_error_status(&self, status: reqwest::StatusCode, body: &serde_json::Value) -> EngineError {
        let detail = body.to_string();
        match status.as_u16() {
            401 | 403 => EngineError::Auth(detail),
            418 | 429 => EngineError::RateLimit(detail),
            500..=599 => EngineError::Temporary(detail),
            _ => EngineError::Exchange(detail),
        }
    }

    /// Margin type doesn't change per trade, so it's set once per symbol and
    /// cached; `"already set"` is a benign `ExchangeError` we must not let
    /// block trading.
    async fn ensure_isolated_margin(&self, symbol: &str) -> Result<(), EngineError> {
        if self.prepared_symbols.lock().contains(symbol) {
            return Ok(());
        }

        let _ = self
            .request_signed(
                reqwest::Method::POST,
                "/fapi/v1/marginType",
                vec![
                    ("symbol".into(), symbol.into()),
                    ("marginType".into(), "ISOLATED".into()),
                ],
                "account",
            )
            .await;

        self.prepared_symbols.lock().insert(symbol.to_string());
        Ok(())
    }

    /// Leverage is per-candidate (spec §4.4.3) and must be (re-)applied on
    /// every call, not cached — unlike margin type it can legitimately
    /// differ between two opens of the same symbol.
    async fn apply_leverage(&self, symbol: &str, leverage: u32) -> Result<(), EngineError> {
        let _ = self
            .request_signed(
                reqwest::Method::POST,
                "/fapi/v1/leverage",
                vec![
                    ("symbol".into(), symbol.into()),
                    ("leverage".into(), leverage.to_string()),
                ],
                "account",
            )
            .await;
        Ok(())
    }

    async fn fetch_trade_pnl_and_fee(
        &self,
        symbol: &str,
        order_id: &str,
        side: OrderSide,
    ) -> (Option<Decimal>, Option<Decimal>) {
        let deadline = tokio::time::Instant::now() + ORDER_POLL_TIMEOUT;

        while tokio::time::Instant::now() < deadline {
            let trades = self
                .request_signed(
                    reqwest::Method::GET,
                    "/fapi/v1/userTrades",
                    vec![
                        ("symbol".into(), symbol.into()),
                        ("orderId".into(), order_id.into()),
                    ],
                    "account",
                )
                .await
                .ok();

            if let Some(serde_json::Value::Array(trades)) = trades {
                if !trades.is_empty() {
                    let mut realized = Decimal::ZERO;
                    let mut fee = Decimal::ZERO;
                    let mut fee_asset_ok = true;

                    for t in &trades {
                        if let Some(r) = t.get("realizedPnl").and_then(|v| v.as_str()) {
                            realized += r.parse::<Decimal>().unwrap_or(Decimal::ZERO);
                        }
                        let comm = t
                            .get("commission")
                            .and_then(|v| v.as_str())
                            .and_then(|s| s.parse::<Decimal>().ok())
                            .unwrap_or(Decimal::ZERO);
                        if let Some(asset) = t.get("commissionAsset").and_then(|v| v.as_str()) {
                            if !asset.is_empty() && asset != "USDT" {
                                fee_asset_ok = false;
                            }
                        }
                        fee += comm;
                    }

                    let fee_out = fee_asset_ok.then_some(fee);
                    let pnl_out = match side {
                        OrderSide::Sell => fee_asset_ok.then_some(realized - fee),
                        OrderSide::Buy => Some(Decimal::ZERO),
                    };
                    return (fee_out, pnl_out);
                }
            }

            tokio::time::sleep(ORDER_POLL_INTERVAL).await;
        }

        (None, None)
    }
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    fn name(&self) -> &'static str {
        "binance"
    }

    #[instrument(skip(self), name = "binance::fetch_klines")]
    async fn fetch_klines(
        &self,
        symbol: &str,
        interval_minutes: i64,
        limit: u32,
        start_ms: Option<i64>,
    ) -> Result<Vec<Bar>, EngineError> {
        let interval = interval_minutes_to_binance(interval_minutes)?;
        let mut query = format!("symbol={symbol}&interval={interval}&limit={limit}");
        if let Some(start) = start_ms {
            query.push_str(&format!("&startTime={start}"));
        }

        let body = self.request_public("/fapi/v1/klines", &query, "market_data").await?;
        let raw = body
            .as_array()
            .ok_or_else(|| EngineError::Internal("klines response is not an array".into()))?;

        let mut bars = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = entry
                .as_array()
                .ok_or_else(|| EngineError::Internal("kline entry is not an array".into()))?;
            if arr.len() < 7 {
                warn!(len = arr.len(), "skipping malformed kline entry");
                continue;
            }
            bars.push(Bar {
                open_time_ms: arr[0].as_i64().unwrap_or(0),
                close_time_ms: arr[6].as_i64().unwrap_or(0),
                open: parse_f64(&arr[1])?,
                high: parse_f64(&arr[2])?,
                low: parse_f64(&arr[3])?,
                close: parse_f64(&arr[4])?,
                volume: parse_f64(&arr[5])?,
            });
        }

        debug!(symbol, count = bars.len(), "klines fetched");
        Ok(bars)
    }

    #[instrument(skip(self, req), name = "binance::place_market_order")]
    async fn place_market_order(&self, req: PlaceOrderRequest) -> Result<OrderResult, EngineError> {
        self.ensure_isolated_margin(&req.symbol).await?;

        let mut params = vec![
            ("symbol".into(), req.symbol.clone()),
            ("side".into(), req.side.as_str().to_string()),
            ("type".into(), "MARKET".into()),
            ("quantity".into(), req.qty.normalize().to_string()),
            ("newClientOrderId".into(), req.client_order_id.clone()),
            ("newOrderRespType".into(), "RESULT".into()),
        ];
        if req.reduce_only {
            params.push(("reduceOnly".into(), "true".into()));
        }

        let data = self
            .request_signed(reqwest::Method::POST, "/fapi/v1/order", params, "order")
            .await?;

        let exchange_order_id = data.get("orderId").map(|v| v.to_string());
        let mut status = binance_status(data.get("status").and_then(|v| v.as_str()).unwrap_or("UNKNOWN"));
        let mut filled_qty = data
            .get("executedQty")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Decimal>().ok())
            .unwrap_or(Decimal::ZERO);

        if status != OrderStatus::Filled {
            let deadline = tokio::time::Instant::now() + ORDER_POLL_TIMEOUT;
            while tokio::time::Instant::now() < deadline && status != OrderStatus::Filled {
                tokio::time::sleep(ORDER_POLL_INTERVAL).await;
                let polled = self.get_order_status(&req.symbol, &req.client_order_id).await?;
                status = polled.status.clone();
                filled_qty = polled.filled_qty;
                if status.is_terminal() {
                    break;
                }
            }
        }

        let (fee_usdt, pnl_usdt) = match &exchange_order_id {
            Some(order_id) => self.fetch_trade_pnl_and_fee(&req.symbol, order_id, req.side).await,
            None => (None, None),
        };

        Ok(OrderResult {
            exchange_order_id,
            status,
            filled_qty,
            avg_price: data
                .get("avgPrice")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Decimal>().ok())
                .filter(|d| !d.is_zero()),
            fee_usdt,
            pnl_usdt,
            raw: data,
        })
    }

    #[instrument(skip(self), name = "binance::get_order_status")]
    async fn get_order_status(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<OrderResult, EngineError> {
        let params = vec![
            ("symbol".into(), symbol.to_string()),
            ("origClientOrderId".into(), client_order_id.to_string()),
        ];
        let data = self
            .request_signed(reqwest::Method::GET, "/fapi/v1/order", params, "account")
            .await?;

        Ok(OrderResult {
            exchange_order_id: data.get("orderId").map(|v| v.to_string()),
            status: binance_status(data.get("status").and_then(|v| v.as_str()).unwrap_or("UNKNOWN")),
            filled_qty: data
                .get("executedQty")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Decimal>().ok())
                .unwrap_or(Decimal::ZERO),
            avg_price: None,
            fee_usdt: None,
            pnl_usdt: None,
            raw: data,
        })
    }

    async fn set_leverage_and_margin_mode(&self, symbol: &str, leverage: u32) -> Result<(), EngineError> {
        self.ensure_isolated_margin(symbol).await?;
        self.apply_leverage(symbol, leverage).await
    }
}

fn parse_f64(val: &serde_json::Value) -> Result<f64, EngineError> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .map_err(|e| EngineError::Internal(format!("failed to parse '{s}' as f64: {e}")))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        Err(EngineError::Internal(format!("expected string or number, got: {val}")))
    }
}

impl std::fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("leverage", &self.leverage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_mapping_known_values() {
        assert_eq!(interval_minutes_to_binance(15).unwrap(), "15m");
        assert_eq!(interval_minutes_to_binance(1440).unwrap(), "1d");
    }

    #[test]
    fn interval_mapping_rejects_unknown() {
        assert!(interval_minutes_to_binance(17).is_err());
    }

    #[test]
    fn status_mapping_normalizes_cancelled_spelling() {
        assert_eq!(binance_status("CANCELED"), OrderStatus::Canceled);
        assert_eq!(binance_status("CANCELLED"), OrderStatus::Canceled);
        assert_eq!(binance_status("FILLED"), OrderStatus::Filled);
        assert_eq!(binance_status("WAT"), OrderStatus::Unknown("WAT".to_string()));
    }

    #[test]
    fn signed_query_is_sorted_and_appends_signature() {
        let client = BinanceFuturesClient::new("key", "secret", 10);
        let qs = client.signed_query(vec![
            ("symbol".into(), "BTCUSDT".into()),
            ("side".into(), "BUY".into()),
        ]);
        assert!(qs.contains("recvWindow=5000"));
        assert!(qs.contains("timestamp="));
        assert!(qs.ends_with(&format!("signature={}", client.sign(qs.rsplit_once("&signature=").unwrap().0))));
        // sorted: recvWindow < side < symbol < timestamp
        let recv_pos = qs.find("recvWindow").unwrap();
        let side_pos = qs.find("side").unwrap();
        assert!(recv_pos < side_pos);
    }
}
