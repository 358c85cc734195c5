//! Data access port trait.

use crate::domain::error::TrendstopError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `code` within `[start_date, end_date]`, ascending by date.
    fn fetch_ohlcv(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, TrendstopError>;

    fn list_symbols(&self) -> Result<Vec<String>, TrendstopError>;

    /// First date, last date and bar count, or `None` if the code has no rows.
    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TrendstopError>;
}
