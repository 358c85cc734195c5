#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
pub use trendstop::domain::ohlcv::OhlcvBar;
use trendstop::domain::error::TrendstopError;
use trendstop::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, TrendstopError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(TrendstopError::Data {
                reason: reason.clone(),
            });
        }
        match self.data.get(code) {
            Some(bars) => Ok(bars
                .iter()
                .filter(|b| b.date >= start_date && b.date <= end_date)
                .cloned()
                .collect()),
            None => Err(TrendstopError::NoData {
                code: code.to_string(),
            }),
        }
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrendstopError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TrendstopError> {
        match self.data.get(code) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Bar dated `day` days after 2024-01-01.
pub fn bar_at(day: usize, open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
    OhlcvBar {
        date: date(2024, 1, 1) + Duration::days(day as i64),
        open,
        high,
        low,
        close,
        volume: 10_000,
    }
}

/// Consecutive daily bars from `(open, high, low, close)` tuples.
pub fn series(start_day: usize, ohlc: &[(f64, f64, f64, f64)]) -> Vec<OhlcvBar> {
    ohlc.iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| bar_at(start_day + i, o, h, l, c))
        .collect()
}

/// 20 flat bars: high 101, low 99, close 100. TR is 2 from bar 1 on, so
/// ATR(14) is 2 and SMA(20) is 100 at bar 19.
pub fn flat_base(start_day: usize) -> Vec<OhlcvBar> {
    series(start_day, &[(100.0, 101.0, 99.0, 100.0); 20])
}

/// Flat base, entry on bar 20, stop trails to 97.5 and is hit on bar 24.
pub fn single_trade_bars(start_day: usize) -> Vec<OhlcvBar> {
    let mut bars = flat_base(start_day);
    bars.extend(series(
        start_day + 20,
        &[
            (100.0, 101.0, 99.5, 100.8),
            (100.8, 101.0, 100.0, 100.8),
            (100.8, 101.0, 100.0, 100.8),
            (100.8, 101.0, 100.0, 100.8),
            (100.0, 100.5, 95.0, 96.0),
        ],
    ));
    bars
}

pub const SINGLE_TRADE_ENTRY: f64 = 100.8;
pub const SINGLE_TRADE_EXIT: f64 = 97.5;

/// Entry on bar 20, adds on bars 21 and 22, capped on 23, stopped on 24.
pub fn pyramid_bars(start_day: usize) -> Vec<OhlcvBar> {
    let mut bars = flat_base(start_day);
    bars.extend(series(
        start_day + 20,
        &[
            (100.0, 101.0, 100.0, 100.9),
            (101.0, 103.0, 100.5, 102.5),
            (102.5, 105.0, 102.0, 104.5),
            (104.5, 107.0, 104.0, 106.0),
            (104.0, 104.5, 90.0, 91.0),
        ],
    ));
    bars
}

/// Strictly falling closes; close never exceeds its moving average.
pub fn declining_bars(count: usize) -> Vec<OhlcvBar> {
    (0..count)
        .map(|i| {
            let c = 200.0 - i as f64;
            bar_at(i, c + 0.5, c + 1.0, c - 1.0, c)
        })
        .collect()
}

/// Flat base then a steady climb whose lows stay above the trailing stop.
pub fn rising_bars(extra: usize) -> Vec<OhlcvBar> {
    let mut bars = flat_base(0);
    for k in 0..extra {
        let c = 101.0 + k as f64 * 0.5;
        bars.push(bar_at(20 + k, c - 0.5, c + 0.5, c - 0.5, c));
    }
    bars
}

/// Renders bars newest first with exchange-style dates and quoted volume,
/// the layout of downloaded price histories.
pub fn to_exchange_csv(bars: &[OhlcvBar]) -> String {
    exchange_rows(bars, |b| {
        format!(
            "\"{}\",{},{},{},{},\"{}\"",
            b.date.format("%b %d, %Y"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        )
    })
}

/// Same layout with nothing quoted, so each date spans two raw fields.
pub fn to_unquoted_exchange_csv(bars: &[OhlcvBar]) -> String {
    exchange_rows(bars, |b| {
        format!(
            "{},{},{},{},{},{}",
            b.date.format("%b %d, %Y"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        )
    })
}

fn exchange_rows(bars: &[OhlcvBar], row: impl Fn(&OhlcvBar) -> String) -> String {
    let mut out = String::from("Date,Open,High,Low,Close,Volume\n");
    for b in bars.iter().rev() {
        out.push_str(&row(b));
        out.push('\n');
    }
    out
}
