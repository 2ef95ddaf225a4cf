// =============================================================================
// Time helpers — tick alignment + HK calendar guard
// =============================================================================
//
// Grounded on `original_source/shared/domain/time.py`: ticks align to wall-
// clock boundaries of `interval_seconds`, computed in the Asia/Hong_Kong
// zone (the only timezone-aware computation per spec §9 — everything else
// is persisted and compared in UTC).

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Asia::Hong_Kong;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Seconds to sleep until the next wall-clock boundary of `interval_seconds`,
/// aligned in the HK zone (DST-free, so this is equivalent to a fixed UTC
/// offset, but computed through the zone for clarity and parity with the
/// Python original).
pub fn next_tick_sleep_seconds(interval_seconds: i64, now: DateTime<Utc>) -> f64 {
    let hk_now = now.with_timezone(&Hong_Kong);
    let epoch = hk_now.timestamp() as f64 + hk_now.timestamp_subsec_millis() as f64 / 1000.0;
    let next_epoch = ((epoch as i64) / interval_seconds + 1) * interval_seconds;
    (next_epoch as f64 - epoch).max(0.0)
}

/// Today's HK calendar date, formatted `YYYY-MM-DD` — the archiver's
/// once-per-day idempotency guard key.
pub fn hk_today(now: DateTime<Utc>) -> String {
    now.with_timezone(&Hong_Kong).format("%Y-%m-%d").to_string()
}

/// `true` during the archiver's daily window (00:00–00:05 HK).
pub fn in_archive_window(now: DateTime<Utc>) -> bool {
    let hk_now = now.with_timezone(&Hong_Kong);
    hk_now.format("%H:%M").to_string() <= "00:05".to_string()
}

pub fn ninety_days_ago_ms(now: DateTime<Utc>) -> i64 {
    (now - Duration::days(90)).timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tick_sleep_is_zero_exactly_on_boundary() {
        // 2024-01-01 00:00:00 UTC is 08:00:00 HK, a multiple of 900s.
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let secs = next_tick_sleep_seconds(900, now);
        assert!(secs < 1.0 || (900.0 - secs) < 1.0);
    }

    #[test]
    fn tick_sleep_never_exceeds_interval() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 3, 17).unwrap();
        let secs = next_tick_sleep_seconds(900, now);
        assert!(secs > 0.0 && secs <= 900.0);
    }

    #[test]
    fn hk_today_formats_as_iso_date() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(hk_today(now), "2024-06-01");
    }

    #[test]
    fn archive_window_closes_after_0005() {
        let inside = Utc.with_ymd_and_hms(2024, 1, 1, 16, 2, 0).unwrap(); // 00:02 HK
        let outside = Utc.with_ymd_and_hms(2024, 1, 1, 17, 0, 0).unwrap(); // 01:00 HK
        assert!(in_archive_window(inside));
        assert!(!in_archive_window(outside));
    }
}
