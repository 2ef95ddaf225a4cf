// =============================================================================
// Risk sizing and leverage mapping
// =============================================================================
//
// Spec §4.4.3. Quantities and prices are `Decimal` from here on down into
// the order lifecycle — matches the teacher's fixed-point handling at the
// exchange boundary, required by spec §3's "≥12 fractional digits" rule.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub const DEFAULT_LEVERAGE_LO: u32 = 10;
pub const DEFAULT_LEVERAGE_HI: u32 = 20;
pub const DEFAULT_MIN_MARGIN_USDT: f64 = 50.0;
pub const DEFAULT_STOP_DIST_PCT: f64 = 0.03;
const QTY_PRECISION: u32 = 6;

/// `leverage = round(lo + (hi-lo) * score/100)`, clamped to `[lo, hi]`.
pub fn leverage_for_score(score: f64, lo: u32, hi: u32) -> u32 {
    let raw = lo as f64 + (hi as f64 - lo as f64) * (score.clamp(0.0, 100.0) / 100.0);
    (raw.round() as i64).clamp(lo as i64, hi as i64) as u32
}

/// Round `value` UP to `precision` decimal places — notional must never
/// fall short of `margin * leverage` due to truncation.
fn ceil_step(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::AwayFromZero)
}

/// `qty_min = ceil_step(margin * leverage / price, precision=6)`.
pub fn qty_min(margin_usdt: Decimal, leverage: u32, price: Decimal) -> Option<Decimal> {
    if price <= Decimal::ZERO {
        return None;
    }
    let notional = margin_usdt * Decimal::from(leverage);
    Some(ceil_step(notional / price, QTY_PRECISION))
}

/// `stop_price = entry_price * (1 - stop_dist_pct)`.
pub fn stop_price(entry_price: Decimal, stop_dist_pct: f64) -> Decimal {
    let factor = Decimal::from_f64(1.0 - stop_dist_pct).unwrap_or(Decimal::ONE);
    entry_price * factor
}

/// Helper for call sites that only have `f64` on hand (e.g. the last close
/// read straight off a cached bar).
pub fn stop_price_f64(entry_price: f64, stop_dist_pct: f64) -> f64 {
    entry_price * (1.0 - stop_dist_pct)
}

pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn leverage_interpolates_linearly() {
        assert_eq!(leverage_for_score(0.0, 10, 20), 10);
        assert_eq!(leverage_for_score(100.0, 10, 20), 20);
        assert_eq!(leverage_for_score(50.0, 10, 20), 15);
    }

    #[test]
    fn leverage_clamps_out_of_range_scores() {
        assert_eq!(leverage_for_score(-10.0, 10, 20), 10);
        assert_eq!(leverage_for_score(200.0, 10, 20), 20);
    }

    #[test]
    fn qty_min_rounds_up_to_guarantee_notional() {
        // margin=50, leverage=10, price=30000 -> notional=500, qty=0.016666...
        let qty = qty_min(dec!(50), 10, dec!(30000)).unwrap();
        assert!(qty >= dec!(500) / dec!(30000));
        assert_eq!(qty.scale().min(6), qty.scale());
    }

    #[test]
    fn qty_min_none_for_nonpositive_price() {
        assert!(qty_min(dec!(50), 10, dec!(0)).is_none());
    }

    #[test]
    fn stop_price_below_entry_for_positive_distance() {
        let sp = stop_price(dec!(100), 0.03);
        assert_eq!(sp, dec!(97.00));
    }
}
