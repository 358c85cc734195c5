//! Simple Moving Average over close prices and volume.
//!
//! SMA(n)[i] = mean(X[i-n+1..=i]); warmup: first (n-1) bars are `None`.

use crate::domain::indicator::rolling_mean;
use crate::domain::ohlcv::OhlcvBar;

pub fn close_sma(bars: &[OhlcvBar], window: usize) -> Vec<Option<f64>> {
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    rolling_mean(&closes, window)
}

pub fn volume_sma(bars: &[OhlcvBar], window: usize) -> Vec<Option<f64>> {
    let volumes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.volume as f64)).collect();
    rolling_mean(&volumes, window)
}
