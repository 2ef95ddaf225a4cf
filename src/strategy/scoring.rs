// =============================================================================
// Candidate scoring — robot_score + AI blend
// =============================================================================
//
// Spec §4.4.2's exact formulas. Grounded on the teacher's `strategy.rs`
// scoring pass for the clamp/blend shape, with the constants replaced by
// the spec's.

use crate::strategy::signal::Signal;

pub const DEFAULT_AI_WEIGHT: f64 = 0.35;

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// `trend_score = clamp(|ema_fast - ema_slow| / price * 100 * 500, 0, 50)`.
pub fn trend_score(ema_fast: f64, ema_slow: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    clamp((ema_fast - ema_slow).abs() / price * 100.0 * 500.0, 0.0, 50.0)
}

/// `rsi_score = clamp((70 - rsi)/40 * 50, 0, 50)` for BUY, symmetric
/// (`(rsi - 30)/40 * 50`) for SELL. Missing RSI scores 0 — the caller still
/// has the EMA crossover to go on.
pub fn rsi_score(rsi: Option<f64>, side: Signal) -> f64 {
    let Some(rsi) = rsi else { return 0.0 };
    let raw = match side {
        Signal::Buy => (70.0 - rsi) / 40.0 * 50.0,
        Signal::Sell => (rsi - 30.0) / 40.0 * 50.0,
    };
    clamp(raw, 0.0, 50.0)
}

/// `robot_score = clamp(trend_score + rsi_score, 0, 100)`.
pub fn robot_score(ema_fast: f64, ema_slow: f64, price: f64, rsi: Option<f64>, side: Signal) -> f64 {
    clamp(trend_score(ema_fast, ema_slow, price) + rsi_score(rsi, side), 0.0, 100.0)
}

/// `combined = (1-w)*robot_score + w*(ai_prob*100)`. `ai_prob` is `None`
/// when the AI scorer is disabled, in which case `combined == robot_score`.
pub fn combined_score(robot_score: f64, ai_prob: Option<f64>, weight: f64) -> f64 {
    match ai_prob {
        Some(p) => (1.0 - weight) * robot_score + weight * (p * 100.0),
        None => robot_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_score_clamps_at_50() {
        assert_eq!(trend_score(110.0, 100.0, 100.0), 50.0);
    }

    #[test]
    fn trend_score_zero_when_emas_equal() {
        assert_eq!(trend_score(100.0, 100.0, 100.0), 0.0);
    }

    #[test]
    fn rsi_score_missing_is_zero() {
        assert_eq!(rsi_score(None, Signal::Buy), 0.0);
    }

    #[test]
    fn rsi_score_buy_peaks_at_low_rsi() {
        assert_eq!(rsi_score(Some(30.0), Signal::Buy), 50.0);
        assert_eq!(rsi_score(Some(70.0), Signal::Buy), 0.0);
    }

    #[test]
    fn combined_score_without_ai_is_robot_score() {
        assert_eq!(combined_score(62.0, None, DEFAULT_AI_WEIGHT), 62.0);
    }

    #[test]
    fn combined_score_blends_ai_probability() {
        let combined = combined_score(50.0, Some(0.9), 0.35);
        assert!((combined - (0.65 * 50.0 + 0.35 * 90.0)).abs() < 1e-9);
    }
}
