//! Technical indicators over a daily bar sequence.
//!
//! Every indicator is a pure function of the bars and its window:
//! - [`atr`]: True Range and its simple rolling mean (ATR)
//! - [`sma`]: simple moving averages of close and volume
//!
//! Values that cannot be computed yet (warmup) are `None`, never `0.0`.
//! [`enrich`] attaches all of them to the bars as [`EnrichedBar`]s.

pub mod atr;
pub mod sma;

use std::fmt;

use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_ATR_PERIOD: usize = 14;
pub const DEFAULT_MA_WINDOW: usize = 20;
pub const DEFAULT_VOLUME_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Atr(usize),
    Sma(usize),
    VolumeSma(usize),
}

impl IndicatorType {
    /// First bar index at which this indicator is defined.
    pub fn first_valid_index(&self) -> usize {
        match self {
            // True Range starts at index 1, so a full window ends at `period`.
            IndicatorType::Atr(period) => *period,
            IndicatorType::Sma(window) | IndicatorType::VolumeSma(window) => {
                window.saturating_sub(1)
            }
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Sma(window) => write!(f, "SMA({})", window),
            IndicatorType::VolumeSma(window) => write!(f, "VOLUME_SMA({})", window),
        }
    }
}

/// Lookback windows for the indicator engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    pub atr_period: usize,
    pub ma_window: usize,
    pub volume_window: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            atr_period: DEFAULT_ATR_PERIOD,
            ma_window: DEFAULT_MA_WINDOW,
            volume_window: DEFAULT_VOLUME_WINDOW,
        }
    }
}

impl IndicatorParams {
    pub fn indicators(&self) -> [IndicatorType; 3] {
        [
            IndicatorType::Atr(self.atr_period),
            IndicatorType::Sma(self.ma_window),
            IndicatorType::VolumeSma(self.volume_window),
        ]
    }
}

/// A bar plus its derived indicator values.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedBar {
    pub bar: OhlcvBar,
    pub true_range: Option<f64>,
    pub atr: Option<f64>,
    pub ma: Option<f64>,
    pub volume_ma: Option<f64>,
}

/// Computes True Range, ATR, close SMA and volume SMA for every bar.
///
/// Bars must already be in ascending date order.
pub fn enrich(bars: &[OhlcvBar], params: &IndicatorParams) -> Vec<EnrichedBar> {
    let true_range = atr::true_range_series(bars);
    let atr = atr::calc_atr(&true_range, params.atr_period);
    let ma = sma::close_sma(bars, params.ma_window);
    let volume_ma = sma::volume_sma(bars, params.volume_window);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| EnrichedBar {
            bar: bar.clone(),
            true_range: true_range[i],
            atr: atr[i],
            ma: ma[i],
            volume_ma: volume_ma[i],
        })
        .collect()
}

/// Simple rolling mean over a series with gaps.
///
/// The value at `i` is defined only when all `window` inputs ending at `i`
/// are defined. A zero window yields an all-`None` series.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let mut sum = 0.0;
            for value in &values[i + 1 - window..=i] {
                sum += (*value)?;
            }
            Some(sum / window as f64)
        })
        .collect()
}
