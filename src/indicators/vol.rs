// =============================================================================
// Volume indicators — vol_sma20 / vol_ratio
// =============================================================================
//
// vol_sma20 is a plain SMA of traded volume over a 20-bar window; vol_ratio
// compares the most recent bar's volume against it to flag unusual activity.

/// Simple moving average of volume over `period` bars.
///
/// Returns `None` when `period` is zero or there are fewer than `period`
/// volumes.
pub fn calculate_vol_sma(volumes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || volumes.len() < period {
        return None;
    }

    let window = &volumes[volumes.len() - period..];
    let sma = window.iter().sum::<f64>() / period as f64;

    if sma.is_finite() {
        Some(sma)
    } else {
        None
    }
}

/// Ratio of the most recent volume to its `period`-bar SMA.
///
/// Returns `None` when the SMA is unavailable, zero, or the result is
/// non-finite.
pub fn calculate_vol_ratio(volumes: &[f64], period: usize) -> Option<f64> {
    let sma = calculate_vol_sma(volumes, period)?;
    if sma == 0.0 {
        return None;
    }
    let last = *volumes.last()?;
    let ratio = last / sma;

    if ratio.is_finite() {
        Some(ratio)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vol_sma_insufficient_data() {
        assert!(calculate_vol_sma(&[1.0, 2.0], 20).is_none());
    }

    #[test]
    fn vol_sma_basic() {
        let volumes = vec![10.0; 20];
        let sma = calculate_vol_sma(&volumes, 20).unwrap();
        assert!((sma - 10.0).abs() < 1e-10);
    }

    #[test]
    fn vol_ratio_spike() {
        let mut volumes = vec![10.0; 20];
        volumes.push(50.0); // 21st bar — last 20 for the SMA still average 10.0
        let ratio = calculate_vol_ratio(&volumes, 20).unwrap();
        assert!((ratio - 5.0).abs() < 1e-9, "expected ratio 5.0, got {ratio}");
    }

    #[test]
    fn vol_ratio_zero_sma() {
        let volumes = vec![0.0; 20];
        assert!(calculate_vol_ratio(&volumes, 20).is_none());
    }
}
