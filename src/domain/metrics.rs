//! Trade statistics over realized returns.

use crate::domain::backtest::BacktestResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Trades that lost more than the failure threshold.
    pub failure_count: usize,
    /// Sum of losing returns, in percent. Never positive.
    pub total_loss_pct: f64,
    pub trade_count: usize,
    /// Mean return in percent; 0 when nothing closed.
    pub avg_pl_pct: f64,
}

impl Metrics {
    pub fn compute(returns: &[f64], loss_failure_threshold: f64) -> Self {
        let failure_count = returns
            .iter()
            .filter(|&&pl| pl < loss_failure_threshold)
            .count();

        let total_loss: f64 = returns.iter().map(|&pl| pl.min(0.0)).sum();

        let trade_count = returns.len();
        let avg_pl_pct = if trade_count > 0 {
            returns.iter().sum::<f64>() / trade_count as f64 * 100.0
        } else {
            0.0
        };

        Metrics {
            failure_count,
            total_loss_pct: total_loss * 100.0,
            trade_count,
            avg_pl_pct,
        }
    }
}

/// Per-symbol outcome of a multi-code run.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeResult {
    pub code: String,
    pub bars: usize,
    pub metrics: Metrics,
    pub open_position: bool,
}

impl CodeResult {
    pub fn from_result(
        code: &str,
        bars: usize,
        result: &BacktestResult,
        loss_failure_threshold: f64,
    ) -> Self {
        CodeResult {
            code: code.to_string(),
            bars,
            metrics: result.metrics(loss_failure_threshold),
            open_position: result.open_position.is_some(),
        }
    }
}

/// Metrics over every closed trade across all symbols.
pub fn aggregate(results: &[BacktestResult], loss_failure_threshold: f64) -> Metrics {
    let returns: Vec<f64> = results.iter().flat_map(|r| r.returns()).collect();
    Metrics::compute(&returns, loss_failure_threshold)
}
