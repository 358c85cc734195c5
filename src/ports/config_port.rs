//! Configuration access port trait.
//!
//! Absent keys fall back to the caller's default; present but malformed
//! values are `ConfigInvalid` errors.

use std::str::FromStr;

use crate::domain::error::TrendstopError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Comma-separated list; `None` when the key is absent or blank.
    fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        let raw = self.get_string(section, key)?;
        if raw.trim().is_empty() {
            return None;
        }
        Some(raw.split(',').map(|s| s.trim().to_string()).collect())
    }
}

fn non_blank(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_parsed<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, TrendstopError> {
    match non_blank(config, section, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            TrendstopError::config_invalid(section, key, format!("cannot parse '{raw}'"))
        }),
    }
}

pub fn get_optional<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, TrendstopError> {
    match non_blank(config, section, key) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            TrendstopError::config_invalid(section, key, format!("cannot parse '{raw}'"))
        }),
    }
}

pub fn get_flag(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, TrendstopError> {
    match non_blank(config, section, key) {
        None => Ok(default),
        Some(raw) => parse_bool(&raw).ok_or_else(|| {
            TrendstopError::config_invalid(section, key, format!("expected true/false, got '{raw}'"))
        }),
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
