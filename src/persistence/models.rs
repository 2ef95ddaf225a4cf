// =============================================================================
// Row models — spec §3's tables, one struct per entity
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct MarketDataRow {
    pub symbol: String,
    pub interval_minutes: i32,
    pub open_time_ms: i64,
    pub close_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MarketDataCacheRow {
    pub symbol: String,
    pub interval_minutes: i32,
    pub open_time_ms: i64,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub features_json: Json<Value>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PrecomputeTaskRow {
    pub id: i64,
    pub symbol: String,
    pub interval_minutes: i32,
    pub open_time_ms: i64,
    pub status: String,
    pub try_count: i32,
    pub last_error: Option<String>,
    pub trace_id: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderEventRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub trace_id: String,
    pub service: String,
    pub exchange: String,
    pub symbol: String,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub event_type: String,
    pub side: String,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub status: String,
    pub reason_code: String,
    pub reason: Option<String>,
    pub payload_json: Json<Value>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PositionSnapshotRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub symbol: String,
    pub base_qty: Decimal,
    pub avg_entry_price: Decimal,
    pub meta_json: Json<Value>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TradeLogRow {
    pub id: i64,
    pub trace_id: String,
    pub symbol: String,
    pub side: String,
    pub qty: Decimal,
    pub leverage: i32,
    pub stop_dist_pct: Decimal,
    pub stop_price: Decimal,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub robot_score: f64,
    pub ai_prob: Option<f64>,
    pub open_reason_code: String,
    pub open_reason: Option<String>,
    pub close_reason_code: Option<String>,
    pub close_reason: Option<String>,
    pub entry_time_ms: i64,
    pub exit_time_ms: Option<i64>,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub features_json: Json<Value>,
    pub label: Option<i32>,
    pub status: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct SystemConfigRow {
    pub cfg_key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ConfigAuditRow {
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub cfg_key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub trace_id: String,
    pub reason_code: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ArchiveAuditRow {
    pub id: i64,
    pub trace_id: String,
    pub table_name: String,
    pub cutoff_days: i32,
    pub moved_rows: i64,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceStatusRow {
    pub service_name: String,
    pub instance_id: String,
    pub last_heartbeat: DateTime<Utc>,
    pub status_json: Json<Value>,
}
