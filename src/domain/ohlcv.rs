//! Daily OHLCV bar and input ordering checks.

use chrono::NaiveDate;

use crate::domain::error::TrendstopError;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl OhlcvBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Checks that dates are strictly ascending.
///
/// Reports the first offending index, so callers can point at the bad row.
pub fn validate_ordering(bars: &[OhlcvBar]) -> Result<(), TrendstopError> {
    for (i, pair) in bars.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.date == prev.date {
            return Err(TrendstopError::DuplicateDate {
                index: i + 1,
                date: curr.date,
            });
        }
        if curr.date < prev.date {
            return Err(TrendstopError::UnorderedBars {
                index: i + 1,
                date: curr.date,
                previous: prev.date,
            });
        }
    }
    Ok(())
}

/// Keeps only the final `count` bars.
pub fn last_bars(bars: &[OhlcvBar], count: usize) -> &[OhlcvBar] {
    &bars[bars.len().saturating_sub(count)..]
}
