// =============================================================================
// Bar — a single OHLCV candlestick, keyed the way `market_data` is keyed
// =============================================================================
//
// This is the in-memory counterpart of the `market_data` row (spec §3):
// `open_time_ms` is aligned to the bar's `interval_minutes` boundary and,
// together with `symbol`/`interval_minutes`, forms the table's composite key.
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar for a `(symbol, interval_minutes)` series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time_ms: i64,
    pub close_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Round-trip helper: reconstruct an `f64`-math `Bar` from the
    /// `Decimal`-typed columns persisted in `market_data`.
    pub fn from_decimal(
        open_time_ms: i64,
        close_time_ms: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        use rust_decimal::prelude::ToPrimitive;
        Self {
            open_time_ms,
            close_time_ms,
            open: open.to_f64().unwrap_or(0.0),
            high: high.to_f64().unwrap_or(0.0),
            low: low.to_f64().unwrap_or(0.0),
            close: close.to_f64().unwrap_or(0.0),
            volume: volume.to_f64().unwrap_or(0.0),
        }
    }

    /// `true` when `open_time_ms` falls on an `interval_minutes` boundary,
    /// per spec §3's `market_data` invariant.
    pub fn is_aligned(&self, interval_minutes: i64) -> bool {
        let interval_ms = interval_minutes * 60_000;
        interval_ms > 0 && self.open_time_ms % interval_ms == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_boundary() {
        let bar = Bar {
            open_time_ms: 900_000,
            close_time_ms: 1_799_999,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        assert!(bar.is_aligned(15));
    }

    #[test]
    fn misaligned_boundary() {
        let bar = Bar {
            open_time_ms: 900_001,
            close_time_ms: 1_799_999,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        assert!(!bar.is_aligned(15));
    }
}
