//! Domain error types.

use chrono::NaiveDate;

use crate::domain::universe::UniverseError;

/// Top-level error type for trendstop.
#[derive(Debug, thiserror::Error)]
pub enum TrendstopError {
    #[error("bars out of order at index {index}: {date} follows {previous}")]
    UnorderedBars {
        index: usize,
        date: NaiveDate,
        previous: NaiveDate,
    },

    #[error("duplicate bar date {date} at index {index}")]
    DuplicateDate { index: usize, date: NaiveDate },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("{source_name}: missing required column '{column}'")]
    MissingColumn { source_name: String, column: String },

    #[error("{source_name} row {row}: {reason}")]
    InvalidBar {
        source_name: String,
        row: usize,
        reason: String,
    },

    #[error("no data for {code}")]
    NoData { code: String },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrendstopError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TrendstopError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this error kind.
    pub fn exit_status(&self) -> u8 {
        match self {
            TrendstopError::Io(_) => 1,
            TrendstopError::ConfigParse { .. }
            | TrendstopError::ConfigInvalid { .. }
            | TrendstopError::Universe(_) => 2,
            TrendstopError::Data { .. }
            | TrendstopError::MissingColumn { .. }
            | TrendstopError::InvalidBar { .. } => 3,
            TrendstopError::UnorderedBars { .. } | TrendstopError::DuplicateDate { .. } => 4,
            TrendstopError::NoData { .. } => 5,
        }
    }
}

impl From<&TrendstopError> for std::process::ExitCode {
    fn from(err: &TrendstopError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
