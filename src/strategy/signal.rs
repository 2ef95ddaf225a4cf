// =============================================================================
// Signal evaluation — "Setup B"
// =============================================================================
//
// Spec §4.4.1, evaluated purely from the latest cached bar's EMA/RSI columns
// (no state carried between ticks — grounded on the teacher's stateless
// `strategy.rs::evaluate_symbol` shape, not the richer multi-indicator
// squeeze/ADX setup in `original_source/strategy/signals.py`, which an
// earlier iteration used before the spec settled on this simpler rule).

use crate::enums::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
}

impl From<Signal> for Side {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Buy => Side::Buy,
            Signal::Sell => Side::Sell,
        }
    }
}

/// BUY when `ema_fast > ema_slow` and (`rsi` is missing or `< 70`).
/// SELL when `ema_fast < ema_slow`. Otherwise no signal.
pub fn evaluate(ema_fast: Option<f64>, ema_slow: Option<f64>, rsi: Option<f64>) -> Option<Signal> {
    let (fast, slow) = (ema_fast?, ema_slow?);

    if fast > slow && rsi.map_or(true, |r| r < 70.0) {
        Some(Signal::Buy)
    } else if fast < slow {
        Some(Signal::Sell)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_when_fast_above_slow_and_rsi_below_70() {
        assert_eq!(evaluate(Some(101.0), Some(100.0), Some(55.0)), Some(Signal::Buy));
    }

    #[test]
    fn buy_allowed_when_rsi_missing() {
        assert_eq!(evaluate(Some(101.0), Some(100.0), None), Some(Signal::Buy));
    }

    #[test]
    fn no_buy_when_rsi_overbought() {
        assert_eq!(evaluate(Some(101.0), Some(100.0), Some(71.0)), None);
    }

    #[test]
    fn sell_when_fast_below_slow_regardless_of_rsi() {
        assert_eq!(evaluate(Some(99.0), Some(100.0), Some(90.0)), Some(Signal::Sell));
    }

    #[test]
    fn no_signal_when_equal_or_missing() {
        assert_eq!(evaluate(Some(100.0), Some(100.0), Some(50.0)), None);
        assert_eq!(evaluate(None, Some(100.0), Some(50.0)), None);
    }
}
