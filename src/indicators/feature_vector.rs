// =============================================================================
// FeatureVector — the joined indicator row persisted to `market_data_cache`
// =============================================================================
//
// One `FeatureVector` corresponds to one cached bar. It composes every
// indicator in this module into the shape the AI scorer and the signal
// evaluator both read.

use serde::{Deserialize, Serialize};

use super::{adx, atr, bollinger, ema, momentum, rsi, vol};
use crate::bar::Bar;

/// The 12 scalar inputs to the online logistic-regression scorer, in the
/// fixed order the model was trained on.
pub const MODEL_INPUT_LEN: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub atr14: Option<f64>,
    pub adx14: Option<f64>,
    pub plus_di14: Option<f64>,
    pub minus_di14: Option<f64>,
    pub bb_mid20: Option<f64>,
    pub bb_upper20: Option<f64>,
    pub bb_lower20: Option<f64>,
    pub bb_width20: Option<f64>,
    pub vol_sma20: Option<f64>,
    pub vol_ratio: Option<f64>,
    pub mom10: Option<f64>,
    pub ret1: Option<f64>,
    pub ret_std20: Option<f64>,
}

impl FeatureVector {
    /// Compute every indicator against the trailing window ending at the
    /// last element of `bars`. `bars` must be ascending by `open_time_ms`.
    ///
    /// `ema_fast_period`/`ema_slow_period` are configurable per spec §4.1
    /// (7/12 and 25/26 respectively); everything else uses its standard
    /// fixed window (RSI14, ATR/ADX/DI 14, Bollinger 20, vol_sma20, mom10,
    /// ret_std20).
    pub fn compute(bars: &[Bar], ema_fast_period: usize, ema_slow_period: usize) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let ema_fast = ema::calculate_ema(&closes, ema_fast_period).last().copied();
        let ema_slow = ema::calculate_ema(&closes, ema_slow_period).last().copied();
        let rsi = rsi::current_rsi(&closes, 14).map(|(v, _)| v);
        let atr14 = atr::calculate_atr(bars, 14);
        let adx14 = adx::calculate_adx(bars, 14);
        let (plus_di14, minus_di14) = match adx::calculate_di(bars, 14) {
            Some((p, m)) => (Some(p), Some(m)),
            None => (None, None),
        };
        let bb = bollinger::calculate_bollinger(&closes, 20, 2.0);
        let vol_sma20 = vol::calculate_vol_sma(&volumes, 20);
        let vol_ratio = vol::calculate_vol_ratio(&volumes, 20);
        let mom10 = momentum::calculate_momentum(&closes, 10);
        let ret1 = momentum::calculate_ret1(&closes);
        let ret_std20 = momentum::calculate_ret_std(&closes, 20);

        Self {
            ema_fast,
            ema_slow,
            rsi,
            atr14,
            adx14,
            plus_di14,
            minus_di14,
            bb_mid20: bb.as_ref().map(|b| b.middle),
            bb_upper20: bb.as_ref().map(|b| b.upper),
            bb_lower20: bb.as_ref().map(|b| b.lower),
            bb_width20: bb.as_ref().map(|b| b.width),
            vol_sma20,
            vol_ratio,
            mom10,
            ret1,
            ret_std20,
        }
    }

    /// Flatten to the fixed 12-dim model input, substituting the spec's
    /// documented defaults for missing values: 0 for everything except RSI,
    /// which defaults to 50 (neutral).
    pub fn to_model_input(&self) -> [f64; MODEL_INPUT_LEN] {
        [
            self.ema_fast.unwrap_or(0.0),
            self.ema_slow.unwrap_or(0.0),
            self.rsi.unwrap_or(50.0),
            self.atr14.unwrap_or(0.0),
            self.adx14.unwrap_or(0.0),
            self.plus_di14.unwrap_or(0.0),
            self.minus_di14.unwrap_or(0.0),
            self.bb_width20.unwrap_or(0.0),
            self.vol_ratio.unwrap_or(0.0),
            self.mom10.unwrap_or(0.0),
            self.ret1.unwrap_or(0.0),
            self.ret_std20.unwrap_or(0.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(i: usize) -> Bar {
        let base = 100.0 + i as f64 * 0.3 + (i as f64 * 0.2).sin() * 2.0;
        Bar {
            open_time_ms: i as i64 * 60_000,
            close_time_ms: i as i64 * 60_000 + 59_999,
            open: base,
            high: base + 1.5,
            low: base - 1.5,
            close: base + 0.2,
            volume: 100.0 + (i as f64 * 0.1).cos().abs() * 50.0,
        }
    }

    #[test]
    fn empty_input_is_all_none() {
        let fv = FeatureVector::compute(&[], 12, 26);
        assert_eq!(fv, FeatureVector::default());
    }

    #[test]
    fn warm_series_populates_every_field() {
        let bars: Vec<Bar> = (0..120).map(bar).collect();
        let fv = FeatureVector::compute(&bars, 12, 26);

        assert!(fv.ema_fast.is_some());
        assert!(fv.ema_slow.is_some());
        assert!(fv.rsi.is_some());
        assert!(fv.atr14.is_some());
        assert!(fv.bb_width20.is_some());
        assert!(fv.vol_ratio.is_some());
        assert!(fv.mom10.is_some());
        assert!(fv.ret1.is_some());
        assert!(fv.ret_std20.is_some());
    }

    #[test]
    fn model_input_defaults_rsi_to_50_when_missing() {
        let bars: Vec<Bar> = (0..5).map(bar).collect();
        let fv = FeatureVector::compute(&bars, 12, 26);
        assert!(fv.rsi.is_none());
        let input = fv.to_model_input();
        assert_eq!(input.len(), MODEL_INPUT_LEN);
        assert_eq!(input[2], 50.0);
        assert_eq!(input[0], 0.0); // ema_fast also missing with only 5 bars
    }

    #[test]
    fn model_input_length_is_fixed() {
        let bars: Vec<Bar> = (0..120).map(bar).collect();
        let fv = FeatureVector::compute(&bars, 12, 26);
        assert_eq!(fv.to_model_input().len(), 12);
    }
}
