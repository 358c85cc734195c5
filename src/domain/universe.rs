//! Symbol universe and data windows for multi-code runs.
//!
//! Each code is loaded and backtested on its own, with its own copy of the
//! configuration; nothing is shared between runs except the results list.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::backtest::{BacktestConfig, BacktestResult, run_backtest};
use crate::domain::error::TrendstopError;
use crate::domain::metrics::CodeResult;
use crate::domain::ohlcv::{OhlcvBar, last_bars};
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),

    #[error("no codes configured")]
    NoCodes,

    #[error("all codes failed validation")]
    AllCodesFailed,
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    if input.trim().is_empty() {
        return Err(UniverseError::NoCodes);
    }

    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// Which slice of each symbol's history to test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Keep only the final N bars after date filtering.
    pub last_bars: Option<usize>,
}

impl Default for DataWindow {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::MIN,
            end_date: NaiveDate::MAX,
            last_bars: None,
        }
    }
}

pub fn load_bars(
    data_port: &dyn DataPort,
    code: &str,
    window: &DataWindow,
) -> Result<Vec<OhlcvBar>, TrendstopError> {
    let bars = data_port.fetch_ohlcv(code, window.start_date, window.end_date)?;
    if bars.is_empty() {
        return Err(TrendstopError::NoData {
            code: code.to_string(),
        });
    }
    Ok(match window.last_bars {
        Some(n) => last_bars(&bars, n).to_vec(),
        None => bars,
    })
}

#[derive(Debug, Clone)]
pub struct SkippedCode {
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct UniverseRun {
    pub codes: Vec<CodeResult>,
    pub results: Vec<BacktestResult>,
    pub skipped: Vec<SkippedCode>,
}

/// Backtests every code in turn.
///
/// Codes without data are skipped with a warning; any other error (bad rows,
/// duplicate dates, invalid config) aborts the whole run.
pub fn run_universe(
    data_port: &dyn DataPort,
    codes: &[String],
    window: &DataWindow,
    config: &BacktestConfig,
) -> Result<UniverseRun, TrendstopError> {
    let mut run = UniverseRun {
        codes: Vec::with_capacity(codes.len()),
        results: Vec::with_capacity(codes.len()),
        skipped: Vec::new(),
    };

    for code in codes {
        let bars = match load_bars(data_port, code, window) {
            Ok(bars) => bars,
            Err(TrendstopError::NoData { .. }) => {
                warn!(code = %code, "skipping: no data found");
                run.skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: "no data".to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        info!(code = %code, bars = bars.len(), "running backtest");
        let code_config = config.clone();
        let result = run_backtest(&bars, &code_config)?;
        run.codes.push(CodeResult::from_result(
            code,
            bars.len(),
            &result,
            code_config.loss_failure_threshold,
        ));
        run.results.push(result);
    }

    if run.results.is_empty() {
        return Err(UniverseError::AllCodesFailed.into());
    }
    Ok(run)
}
