//! Configuration validation.
//!
//! Runs before any bar is read. Errors name the INI section and key the
//! value comes from.

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::TrendstopError;

pub fn validate_backtest_config(config: &BacktestConfig) -> Result<(), TrendstopError> {
    validate_periods(config)?;
    validate_atr_multiplier(config)?;
    validate_pyramid(config)?;
    validate_loss_threshold(config)?;
    validate_volume_filter(config)?;
    Ok(())
}

fn validate_periods(config: &BacktestConfig) -> Result<(), TrendstopError> {
    let params = &config.indicators;
    for (key, value) in [
        ("atr_period", params.atr_period),
        ("ma_window", params.ma_window),
        ("volume_window", params.volume_window),
    ] {
        if value == 0 {
            return Err(TrendstopError::config_invalid(
                "indicators",
                key,
                format!("{key} must be at least 1"),
            ));
        }
    }
    Ok(())
}

fn validate_atr_multiplier(config: &BacktestConfig) -> Result<(), TrendstopError> {
    let value = config.atr_multiplier;
    if !value.is_finite() || value < 0.0 {
        return Err(TrendstopError::config_invalid(
            "strategy",
            "atr_multiplier",
            "atr_multiplier must be a non-negative number",
        ));
    }
    Ok(())
}

fn validate_pyramid(config: &BacktestConfig) -> Result<(), TrendstopError> {
    if config.add_size_fractions.len() != config.max_adds {
        return Err(TrendstopError::config_invalid(
            "strategy",
            "add_size_fractions",
            format!(
                "expected {} fractions for max_adds = {}, got {}",
                config.max_adds,
                config.max_adds,
                config.add_size_fractions.len()
            ),
        ));
    }
    if let Some(bad) = config
        .add_size_fractions
        .iter()
        .find(|f| !f.is_finite() || **f <= 0.0)
    {
        return Err(TrendstopError::config_invalid(
            "strategy",
            "add_size_fractions",
            format!("fraction {bad} must be positive"),
        ));
    }
    Ok(())
}

fn validate_loss_threshold(config: &BacktestConfig) -> Result<(), TrendstopError> {
    let value = config.loss_failure_threshold;
    if !(-1.0..=0.0).contains(&value) {
        return Err(TrendstopError::config_invalid(
            "strategy",
            "loss_failure_threshold",
            "loss_failure_threshold must be between -1 and 0",
        ));
    }
    Ok(())
}

fn validate_volume_filter(config: &BacktestConfig) -> Result<(), TrendstopError> {
    if let Some(filter) = config.volume_filter {
        if !filter.multiplier.is_finite() || filter.multiplier <= 0.0 {
            return Err(TrendstopError::config_invalid(
                "strategy",
                "volume_multiplier",
                "volume_multiplier must be positive",
            ));
        }
    }
    Ok(())
}
