// =============================================================================
// system_config + config_audit — transactional writer
// =============================================================================
//
// Spec §3's invariant: every `system_config` write has a paired
// `config_audit` row in the same transaction. Both statements commit or
// roll back together via a single sqlx transaction.

use sqlx::MySqlPool;

use crate::enums::ReasonCode;
use crate::error::EngineError;

pub async fn get(pool: &MySqlPool, key: &str) -> Result<Option<String>, EngineError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM system_config WHERE cfg_key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;
    Ok(row.map(|(v,)| v))
}

pub async fn get_bool(pool: &MySqlPool, key: &str, default: bool) -> Result<bool, EngineError> {
    Ok(get(pool, key)
        .await?
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default))
}

/// Write `system_config[key] = value` and a matching `config_audit` row,
/// committed together.
pub async fn set(
    pool: &MySqlPool,
    actor: &str,
    key: &str,
    value: &str,
    trace_id: &str,
    reason_code: ReasonCode,
    reason: &str,
) -> Result<(), EngineError> {
    let old_value = get(pool, key).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;

    sqlx::query(
        r#"
        INSERT INTO system_config(cfg_key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON DUPLICATE KEY UPDATE value = VALUES(value), updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(&mut *tx)
    .await
    .map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;

    sqlx::query(
        r#"
        INSERT INTO config_audit(actor, action, cfg_key, old_value, new_value, trace_id, reason_code, reason)
        VALUES (?, 'SET', ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(actor)
    .bind(key)
    .bind(&old_value)
    .bind(value)
    .bind(trace_id)
    .bind(reason_code.as_str())
    .bind(reason)
    .execute(&mut *tx)
    .await
    .map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;

    tx.commit().await.map_err(|e| crate::error::classify_sqlx_error(&e, ""))?;
    Ok(())
}
