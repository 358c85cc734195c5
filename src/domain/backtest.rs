//! Backtest engine: the per-bar trailing-stop state machine.
//!
//! A run is `validate → enrich → simulate`. The simulator walks the enriched
//! bars once, holding at most one [`Position`]:
//!
//! - Flat: enter at the close when it is above the moving average.
//! - In trade (including the entry bar): trail the stop by
//!   `high - atr_multiplier * ATR`, pyramid on a close above the prior high,
//!   then exit at the stop if the low trades through it.
//!
//! A position still open when the bars run out is reported in
//! [`BacktestResult::open_position`] but never counted as a trade.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::config_validation::validate_backtest_config;
use crate::domain::error::TrendstopError;
use crate::domain::indicator::{EnrichedBar, IndicatorParams, enrich};
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::{OhlcvBar, validate_ordering};
use crate::domain::position::{ClosedTrade, EntryAveraging, Position};

pub const DEFAULT_ATR_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_ADDS: usize = 2;
pub const DEFAULT_ADD_SIZE_FRACTIONS: [f64; 2] = [0.5, 0.25];
pub const DEFAULT_LOSS_FAILURE_THRESHOLD: f64 = -0.20;
pub const DEFAULT_VOLUME_MULTIPLIER: f64 = 1.5;

/// Entry confirmation: volume must exceed its moving average by `multiplier`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeFilter {
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub indicators: IndicatorParams,
    pub atr_multiplier: f64,
    pub pyramid_enabled: bool,
    pub max_adds: usize,
    pub add_size_fractions: Vec<f64>,
    pub loss_failure_threshold: f64,
    pub entry_averaging: EntryAveraging,
    pub volume_filter: Option<VolumeFilter>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorParams::default(),
            atr_multiplier: DEFAULT_ATR_MULTIPLIER,
            pyramid_enabled: true,
            max_adds: DEFAULT_MAX_ADDS,
            add_size_fractions: DEFAULT_ADD_SIZE_FRACTIONS.to_vec(),
            loss_failure_threshold: DEFAULT_LOSS_FAILURE_THRESHOLD,
            entry_averaging: EntryAveraging::Legacy,
            volume_filter: None,
        }
    }
}

impl BacktestConfig {
    /// Index of the first bar the simulator evaluates.
    pub fn warmup(&self) -> usize {
        self.indicators.atr_period.max(self.indicators.ma_window)
    }

    fn entry_signal(&self, eb: &EnrichedBar, ma: f64) -> bool {
        if eb.bar.close <= ma {
            return false;
        }
        match self.volume_filter {
            None => true,
            Some(filter) => eb
                .volume_ma
                .is_some_and(|vma| eb.bar.volume as f64 > vma * filter.multiplier),
        }
    }
}

/// Simulator state after a bar has been processed.
#[derive(Debug, Clone, PartialEq)]
pub enum BarState {
    /// Before the warmup index; nothing was evaluated.
    Warmup,
    Flat,
    InTrade {
        entry_index: usize,
        entry_price: f64,
        stop: f64,
        adds: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub index: usize,
    pub date: NaiveDate,
    pub state: BarState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub trades: Vec<ClosedTrade>,
    pub open_position: Option<Position>,
    pub bars_evaluated: usize,
    pub states: Vec<StateSnapshot>,
}

impl BacktestResult {
    /// Realized returns of closed trades, in exit order.
    pub fn returns(&self) -> Vec<f64> {
        self.trades.iter().map(|t| t.pl).collect()
    }

    pub fn metrics(&self, loss_failure_threshold: f64) -> Metrics {
        Metrics::compute(&self.returns(), loss_failure_threshold)
    }
}

/// Validates the config and bar ordering, computes indicators, and simulates.
///
/// Fails before touching any bar if the config is invalid or the dates are
/// not strictly ascending. Too few bars is not an error: the result simply
/// has no trades.
pub fn run_backtest(
    bars: &[OhlcvBar],
    config: &BacktestConfig,
) -> Result<BacktestResult, TrendstopError> {
    validate_backtest_config(config)?;
    validate_ordering(bars)?;

    if bars.len() <= config.warmup() {
        warn!(
            bars = bars.len(),
            warmup = config.warmup(),
            "not enough bars for any signal"
        );
    }

    for indicator in config.indicators.indicators() {
        debug!(%indicator, first_valid = indicator.first_valid_index(), "computing");
    }
    let enriched = enrich(bars, &config.indicators);
    let result = simulate(&enriched, config);

    info!(
        bars = bars.len(),
        evaluated = result.bars_evaluated,
        trades = result.trades.len(),
        open = result.open_position.is_some(),
        "backtest complete"
    );
    Ok(result)
}

/// Runs the state machine over already-enriched bars.
pub fn simulate(bars: &[EnrichedBar], config: &BacktestConfig) -> BacktestResult {
    let warmup = config.warmup();
    let mut position: Option<Position> = None;
    let mut trades = Vec::new();
    let mut states = Vec::with_capacity(bars.len());
    let mut bars_evaluated = 0;

    for (i, eb) in bars.iter().enumerate() {
        let bar = &eb.bar;

        if i < warmup {
            states.push(StateSnapshot {
                index: i,
                date: bar.date,
                state: BarState::Warmup,
            });
            continue;
        }

        // Both indicators must be defined before any entry or stop math.
        let (Some(atr), Some(ma)) = (eb.atr, eb.ma) else {
            states.push(snapshot(i, bar.date, position.as_ref()));
            continue;
        };
        bars_evaluated += 1;

        if position.is_none() && config.entry_signal(eb, ma) {
            let stop = bar.close - config.atr_multiplier * atr;
            debug!(date = %bar.date, price = bar.close, stop, "entry");
            position = Some(Position::open(bar.close, stop, bar.date, i));
        }

        let mut stopped = false;
        if let Some(pos) = position.as_mut() {
            pos.trail_stop(bar.high - config.atr_multiplier * atr);

            let breakout = i > 0 && bar.close > bars[i - 1].bar.high;
            if config.pyramid_enabled && pos.adds < config.max_adds && breakout {
                if let Some(&fraction) = config.add_size_fractions.get(pos.adds) {
                    pos.add(bar.close, fraction, config.entry_averaging);
                    debug!(
                        date = %bar.date,
                        adds = pos.adds,
                        entry_price = pos.entry_price,
                        "pyramid add"
                    );
                }
            }

            stopped = pos.is_stopped(bar.low);
        }

        if stopped {
            if let Some(pos) = position.take() {
                let trade = ClosedTrade::from_stop(&pos, bar.date);
                debug!(date = %bar.date, exit = trade.exit_price, pl = trade.pl, "stopped out");
                trades.push(trade);
            }
        }

        states.push(snapshot(i, bar.date, position.as_ref()));
    }

    BacktestResult {
        trades,
        open_position: position,
        bars_evaluated,
        states,
    }
}

fn snapshot(index: usize, date: NaiveDate, position: Option<&Position>) -> StateSnapshot {
    let state = match position {
        None => BarState::Flat,
        Some(pos) => BarState::InTrade {
            entry_index: pos.entry_index,
            entry_price: pos.entry_price,
            stop: pos.stop,
            adds: pos.adds,
        },
    };
    StateSnapshot { index, date, state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume: 10_000,
        }
    }

    /// 20 flat bars: high 101, low 99, close 100 (TR = 2 from bar 1 on).
    fn flat_base() -> Vec<OhlcvBar> {
        (0..20).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0)).collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = BacktestConfig::default();
        assert_eq!(config.indicators.atr_period, 14);
        assert_eq!(config.indicators.ma_window, 20);
        assert_relative_eq!(config.atr_multiplier, 2.0);
        assert!(config.pyramid_enabled);
        assert_eq!(config.max_adds, 2);
        assert_eq!(config.add_size_fractions, vec![0.5, 0.25]);
        assert_relative_eq!(config.loss_failure_threshold, -0.20);
        assert_eq!(config.entry_averaging, EntryAveraging::Legacy);
        assert!(config.volume_filter.is_none());
        assert_eq!(config.warmup(), 20);
    }

    #[test]
    fn warmup_bars_are_never_evaluated() {
        let bars = flat_base();
        let result = run_backtest(&bars, &BacktestConfig::default()).unwrap();
        assert_eq!(result.bars_evaluated, 0);
        assert!(result.trades.is_empty());
        assert!(result.states.iter().all(|s| s.state == BarState::Warmup));
    }

    #[test]
    fn entry_bar_trails_and_can_exit_immediately() {
        let mut bars = flat_base();
        // Closes above MA but the low crashes through the fresh stop.
        bars.push(bar(20, 100.0, 100.9, 90.0, 100.8));
        let result = run_backtest(&bars, &BacktestConfig::default()).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_date, bars[20].date);
        assert_eq!(trade.exit_date, bars[20].date);
        assert!(result.open_position.is_none());
        assert_eq!(result.states[20].state, BarState::Flat);
    }

    #[test]
    fn close_equal_to_ma_does_not_enter() {
        let mut bars = flat_base();
        bars.push(bar(20, 100.0, 101.0, 99.0, 100.0));
        let result = run_backtest(&bars, &BacktestConfig::default()).unwrap();
        assert_eq!(result.bars_evaluated, 1);
        assert!(result.open_position.is_none());
        assert_eq!(result.states[20].state, BarState::Flat);
    }

    #[test]
    fn breakout_on_entry_bar_counts_as_add() {
        let mut bars = flat_base();
        bars.push(bar(20, 100.0, 102.0, 100.0, 101.5));
        let result = run_backtest(&bars, &BacktestConfig::default()).unwrap();

        let pos = result.open_position.expect("position stays open");
        assert_eq!(pos.adds, 1);
        assert_relative_eq!(pos.entry_price, (101.5 + 101.5 * 0.5) / 1.5);
    }

    #[test]
    fn pyramid_disabled_never_adds() {
        let mut bars = flat_base();
        bars.push(bar(20, 100.0, 102.0, 100.0, 101.5));
        bars.push(bar(21, 101.5, 104.0, 101.0, 103.5));
        let config = BacktestConfig {
            pyramid_enabled: false,
            ..BacktestConfig::default()
        };
        let result = run_backtest(&bars, &config).unwrap();
        let pos = result.open_position.unwrap();
        assert_eq!(pos.adds, 0);
        assert_relative_eq!(pos.entry_price, 101.5);
    }

    #[test]
    fn volume_filter_blocks_quiet_entries() {
        let mut bars = flat_base();
        bars.push(bar(20, 100.0, 101.0, 99.5, 100.8));
        let config = BacktestConfig {
            volume_filter: Some(VolumeFilter { multiplier: 1.5 }),
            ..BacktestConfig::default()
        };
        let quiet = run_backtest(&bars, &config).unwrap();
        assert!(quiet.open_position.is_none());

        bars[20].volume = 50_000;
        let loud = run_backtest(&bars, &config).unwrap();
        assert!(loud.open_position.is_some());
    }

    #[test]
    fn invalid_config_fails_before_ordering_check() {
        let mut bars = flat_base();
        bars.swap(3, 4);
        let config = BacktestConfig {
            atr_multiplier: -1.0,
            ..BacktestConfig::default()
        };
        let err = run_backtest(&bars, &config).unwrap_err();
        assert!(matches!(err, TrendstopError::ConfigInvalid { .. }));
    }

    #[test]
    fn unordered_bars_are_rejected() {
        let mut bars = flat_base();
        bars.swap(3, 4);
        let err = run_backtest(&bars, &BacktestConfig::default()).unwrap_err();
        assert!(matches!(err, TrendstopError::UnorderedBars { index: 4, .. }));
    }

    #[test]
    fn simulate_skips_bars_with_missing_indicators() {
        let mut bars = flat_base();
        bars.push(bar(20, 100.0, 101.0, 99.5, 100.8));
        let mut enriched = enrich(&bars, &IndicatorParams::default());
        enriched[20].atr = None;

        let result = simulate(&enriched, &BacktestConfig::default());
        assert_eq!(result.bars_evaluated, 0);
        assert!(result.open_position.is_none());
    }

    #[test]
    fn simulate_tolerates_short_fraction_list() {
        let mut bars = flat_base();
        bars.push(bar(20, 100.0, 102.0, 100.0, 101.5));
        let enriched = enrich(&bars, &IndicatorParams::default());
        let config = BacktestConfig {
            add_size_fractions: vec![],
            ..BacktestConfig::default()
        };
        let result = simulate(&enriched, &config);
        assert_eq!(result.open_position.unwrap().adds, 0);
    }
}
