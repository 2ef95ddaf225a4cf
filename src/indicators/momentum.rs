// =============================================================================
// Momentum indicators — mom10 / ret1 / ret_std20
// =============================================================================
//
// mom10 is raw price change over a 10-bar lookback; ret1 is the latest
// single-bar return; ret_std20 is the standard deviation of the last 20
// single-bar returns (a short-horizon realised-volatility proxy).

/// `close - close_{n-10}` — raw 10-bar momentum.
///
/// Returns `None` when there are fewer than `period + 1` closes.
pub fn calculate_momentum(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    let last = *closes.last()?;
    let prior = closes[closes.len() - 1 - period];
    let mom = last - prior;

    if mom.is_finite() {
        Some(mom)
    } else {
        None
    }
}

/// `close_t / close_{t-1} - 1` — single-bar return.
///
/// Returns `None` when fewer than two closes are available or the prior
/// close is zero.
pub fn calculate_ret1(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }
    let last = closes[closes.len() - 1];
    let prev = closes[closes.len() - 2];
    if prev == 0.0 {
        return None;
    }
    let ret = last / prev - 1.0;

    if ret.is_finite() {
        Some(ret)
    } else {
        None
    }
}

/// Full series of single-bar returns.
fn returns_series(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter_map(|w| {
            if w[0] == 0.0 {
                None
            } else {
                Some(w[1] / w[0] - 1.0)
            }
        })
        .collect()
}

/// Standard deviation of the last `period` single-bar returns.
///
/// Returns `None` when fewer than `period` returns are available (i.e.
/// fewer than `period + 1` closes).
pub fn calculate_ret_std(closes: &[f64], period: usize) -> Option<f64> {
    let rets = returns_series(closes);
    if rets.len() < period {
        return None;
    }

    let window = &rets[rets.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / period as f64;
    let std = variance.sqrt();

    if std.is_finite() {
        Some(std)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn momentum_insufficient_data() {
        assert!(calculate_momentum(&[1.0, 2.0, 3.0], 10).is_none());
    }

    #[test]
    fn momentum_basic() {
        let closes: Vec<f64> = (1..=11).map(|x| x as f64).collect();
        // close = 11.0, close_{n-10} = closes[0] = 1.0
        let mom = calculate_momentum(&closes, 10).unwrap();
        assert!((mom - 10.0).abs() < 1e-10);
    }

    #[test]
    fn ret1_insufficient_data() {
        assert!(calculate_ret1(&[1.0]).is_none());
    }

    #[test]
    fn ret1_basic() {
        let closes = vec![100.0, 110.0];
        let ret = calculate_ret1(&closes).unwrap();
        assert!((ret - 0.1).abs() < 1e-10);
    }

    #[test]
    fn ret1_zero_prev_guard() {
        let closes = vec![0.0, 10.0];
        assert!(calculate_ret1(&closes).is_none());
    }

    #[test]
    fn ret_std_insufficient_data() {
        let closes = vec![100.0, 101.0, 102.0];
        assert!(calculate_ret_std(&closes, 20).is_none());
    }

    #[test]
    fn ret_std_flat_market() {
        let closes = vec![100.0; 25];
        let std = calculate_ret_std(&closes, 20).unwrap();
        assert!(std.abs() < 1e-10);
    }

    #[test]
    fn ret_std_alternating() {
        let mut closes = Vec::new();
        let mut price = 100.0;
        for i in 0..22 {
            closes.push(price);
            price = if i % 2 == 0 { price * 1.01 } else { price * 0.99 };
        }
        let std = calculate_ret_std(&closes, 20).unwrap();
        assert!(std > 0.0);
        assert!(std.is_finite());
    }
}
