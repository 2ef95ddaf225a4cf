// =============================================================================
// Daily archiver — move stale hot rows into their history counterparts
// =============================================================================
//
// Spec §4.2 step 7 + §3 "Ownership & lifecycle". Ported from
// `original_source/services/data_syncer/main.py::run_daily_archive`: runs
// only inside the 00:00-00:05 HK window, guarded so it fires at most once
// per HK calendar date via the `ARCHIVE_LAST_HK_DATE` system_config key.

use sqlx::MySqlPool;
use tracing::{error, info};

use crate::persistence::{config_store, new_trace_id};
use crate::enums::ReasonCode;

const ARCHIVE_GUARD_KEY: &str = "ARCHIVE_LAST_HK_DATE";
const CUTOFF_DAYS: i64 = 90;
const ARCHIVE_ACTOR: &str = "data-syncer";

struct ArchiveTarget {
    src: &'static str,
    dst: &'static str,
    columns: &'static str,
}

const TARGETS: &[ArchiveTarget] = &[
    ArchiveTarget {
        src: "market_data",
        dst: "market_data_history",
        columns: "symbol,interval_minutes,open_time_ms,close_time_ms,open,high,low,close,volume,created_at",
    },
    ArchiveTarget {
        src: "market_data_cache",
        dst: "market_data_cache_history",
        columns: "symbol,interval_minutes,open_time_ms,ema_fast,ema_slow,rsi,features_json",
    },
    ArchiveTarget {
        src: "order_events",
        dst: "order_events_history",
        columns: "id,created_at,trace_id,service,exchange,symbol,client_order_id,exchange_order_id,event_type,side,qty,price,status,reason_code,reason,payload_json",
    },
    ArchiveTarget {
        src: "position_snapshots",
        dst: "position_snapshots_history",
        columns: "id,created_at,symbol,base_qty,avg_entry_price,meta_json",
    },
    ArchiveTarget {
        src: "trade_logs",
        dst: "trade_logs_history",
        columns: "id,trace_id,symbol,side,qty,leverage,stop_dist_pct,stop_price,client_order_id,exchange_order_id,robot_score,ai_prob,open_reason_code,open_reason,close_reason_code,close_reason,entry_time_ms,exit_time_ms,entry_price,exit_price,pnl,features_json,label,status",
    },
];

/// Move rows older than `CUTOFF_DAYS` from `target.src` into `target.dst`,
/// then delete them from `src`. The explicit column list keeps INSERT/SELECT
/// aligned even though `dst` has an extra `archived_at DEFAULT
/// CURRENT_TIMESTAMP` column — the whole reason this can't be `INSERT ...
/// SELECT *`.
async fn archive_one_table(
    pool: &MySqlPool,
    target: &ArchiveTarget,
    cutoff_ms: i64,
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let time_column = if target.src == "order_events" || target.src == "position_snapshots" {
        "created_at"
    } else {
        "open_time_ms"
    };

    let (insert_sql, delete_sql) = if time_column == "open_time_ms" {
        (
            format!(
                "INSERT IGNORE INTO {} ({cols}) SELECT {cols} FROM {} WHERE open_time_ms < ?",
                target.dst,
                target.src,
                cols = target.columns
            ),
            format!("DELETE FROM {} WHERE open_time_ms < ?", target.src),
        )
    } else {
        (
            format!(
                "INSERT IGNORE INTO {} ({cols}) SELECT {cols} FROM {} WHERE created_at < FROM_UNIXTIME(? / 1000)",
                target.dst,
                target.src,
                cols = target.columns
            ),
            format!("DELETE FROM {} WHERE created_at < FROM_UNIXTIME(? / 1000)", target.src),
        )
    };

    let result = sqlx::query(&insert_sql).bind(cutoff_ms).execute(&mut *tx).await?;
    let moved = result.rows_affected();
    sqlx::query(&delete_sql).bind(cutoff_ms).execute(&mut *tx).await?;

    tx.commit().await?;
    Ok(moved)
}

async fn record_archive_audit(
    pool: &MySqlPool,
    trace_id: &str,
    moved_total: u64,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO archive_audit (trace_id, table_name, cutoff_days, moved_rows, message) \
         VALUES (?, 'ALL', ?, ?, ?)",
    )
    .bind(trace_id)
    .bind(CUTOFF_DAYS as i32)
    .bind(moved_total as i64)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Run the daily archive if we're inside the HK window and haven't already
/// run today. No-op outside the window or once the guard key matches.
pub async fn run_if_due(pool: &MySqlPool, now: chrono::DateTime<chrono::Utc>) -> Result<(), anyhow::Error> {
    if !crate::time::in_archive_window(now) {
        return Ok(());
    }

    let hk_date = crate::time::hk_today(now);
    let last = config_store::get(pool, ARCHIVE_GUARD_KEY).await?;
    if last.as_deref() == Some(hk_date.as_str()) {
        return Ok(());
    }

    let trace_id = new_trace_id();
    let cutoff_ms = crate::time::ninety_days_ago_ms(now);

    let mut moved_total = 0u64;
    for target in TARGETS {
        match archive_one_table(pool, target, cutoff_ms).await {
            Ok(moved) => moved_total += moved,
            Err(e) => {
                error!(table = target.src, error = %e, "archive pass failed for table");
                return Err(e.into());
            }
        }
    }

    let message = format!("archive done hk_date={hk_date}");
    record_archive_audit(pool, &trace_id, moved_total, &message).await?;

    config_store::set(
        pool,
        ARCHIVE_ACTOR,
        ARCHIVE_GUARD_KEY,
        &hk_date,
        &trace_id,
        ReasonCode::System,
        "daily archive guard",
    )
    .await?;

    info!(hk_date, moved_total, "daily archive complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_cover_every_hot_table_with_a_history_counterpart() {
        let srcs: Vec<&str> = TARGETS.iter().map(|t| t.src).collect();
        assert!(srcs.contains(&"market_data"));
        assert!(srcs.contains(&"market_data_cache"));
        assert!(srcs.contains(&"order_events"));
        assert!(srcs.contains(&"position_snapshots"));
        assert!(srcs.contains(&"trade_logs"));
        assert_eq!(srcs.len(), 5);
    }
}
