// =============================================================================
// service_status heartbeat upsert
// =============================================================================
//
// `service_status` is the one mutable table outside the admin plane's
// `system_config`: each (service_name, instance_id) row is overwritten every
// cycle with the latest heartbeat timestamp and a free-form status blob.
// Grounded on `original_source/shared/domain/heartbeat.py`'s
// `INSERT ... ON DUPLICATE KEY UPDATE` upsert.

use sqlx::MySqlPool;

use crate::error::{classify_sqlx_error, EngineError};

pub async fn upsert_service_status(
    pool: &MySqlPool,
    service_name: &str,
    instance_id: &str,
    status: &serde_json::Value,
) -> Result<(), EngineError> {
    sqlx::query(
        r#"
        INSERT INTO service_status(service_name, instance_id, last_heartbeat, status_json)
        VALUES (?, ?, CURRENT_TIMESTAMP, ?)
        ON DUPLICATE KEY UPDATE last_heartbeat = CURRENT_TIMESTAMP, status_json = VALUES(status_json)
        "#,
    )
    .bind(service_name)
    .bind(instance_id)
    .bind(status)
    .execute(pool)
    .await
    .map_err(|e| classify_sqlx_error(&e, "service_status"))?;

    Ok(())
}
