//! Average True Range.
//!
//! TR[i] = max(high[i] - low[i], |high[i] - close[i-1]|, |low[i] - close[i-1]|)
//! for i >= 1. Bar 0 has no previous close and no True Range.
//! ATR(n)[i] = mean(TR[i-n+1..=i]); first defined at i = n.

use crate::domain::indicator::rolling_mean;
use crate::domain::ohlcv::OhlcvBar;

pub fn true_range_series(bars: &[OhlcvBar]) -> Vec<Option<f64>> {
    let mut values = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let tr = if i == 0 {
            None
        } else {
            Some(bar.true_range(bars[i - 1].close))
        };
        values.push(tr);
    }
    values
}

/// ATR over a precomputed True Range series.
pub fn calc_atr(true_range: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling_mean(true_range, period)
}
