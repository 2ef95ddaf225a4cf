// =============================================================================
// Latest bar + feature lookup
// =============================================================================
//
// The strategy tick only ever needs the most recently precomputed bar per
// symbol: its close (for stop-loss/sizing) and its cached `FeatureVector`
// (for signal evaluation/scoring). Joins `market_data` to
// `market_data_cache` on the max `open_time_ms` common to both.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::MySqlPool;

use crate::error::EngineError;
use crate::indicators::FeatureVector;

pub struct LatestBar {
    pub open_time_ms: i64,
    pub close: Decimal,
    pub features: FeatureVector,
}

pub async fn latest(
    pool: &MySqlPool,
    symbol: &str,
    interval_minutes: i64,
) -> Result<Option<LatestBar>, EngineError> {
    let row: Option<(i64, Decimal, sqlx::types::Json<FeatureVector>)> = sqlx::query_as(
        r#"
        SELECT c.open_time_ms, d.close, c.features_json
        FROM market_data_cache c
        INNER JOIN market_data d
            ON d.symbol = c.symbol
           AND d.interval_minutes = c.interval_minutes
           AND d.open_time_ms = c.open_time_ms
        WHERE c.symbol = ? AND c.interval_minutes = ?
        ORDER BY c.open_time_ms DESC
        LIMIT 1
        "#,
    )
    .bind(symbol)
    .bind(interval_minutes)
    .fetch_optional(pool)
    .await
    .map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;

    Ok(row.map(|(open_time_ms, close, features)| LatestBar {
        open_time_ms,
        close,
        features: features.0,
    }))
}

pub fn close_f64(bar: &LatestBar) -> f64 {
    bar.close.to_f64().unwrap_or(0.0)
}
