//! Open position state and closed trades.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

/// How a pyramid add re-averages the entry price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryAveraging {
    /// `(entry + close * fraction) / (1 + adds * 0.5)`, with `adds` the new
    /// add count. Not a lot-weighted mean.
    #[default]
    Legacy,
    /// Lot-weighted mean of all fills, the initial lot counting as 1.0.
    Weighted,
}

impl fmt::Display for EntryAveraging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryAveraging::Legacy => write!(f, "legacy"),
            EntryAveraging::Weighted => write!(f, "weighted"),
        }
    }
}

impl FromStr for EntryAveraging {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(EntryAveraging::Legacy),
            "weighted" => Ok(EntryAveraging::Weighted),
            other => Err(format!("unknown averaging mode '{other}' (expected legacy or weighted)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub entry_price: f64,
    pub stop: f64,
    pub adds: usize,
    /// Position size in units of the initial lot.
    pub units: f64,
    pub entry_date: NaiveDate,
    pub entry_index: usize,
}

impl Position {
    pub fn open(entry_price: f64, stop: f64, entry_date: NaiveDate, entry_index: usize) -> Self {
        Self {
            entry_price,
            stop,
            adds: 0,
            units: 1.0,
            entry_date,
            entry_index,
        }
    }

    /// Raises the stop to `candidate` if that is tighter. Never loosens.
    pub fn trail_stop(&mut self, candidate: f64) {
        self.stop = self.stop.max(candidate);
    }

    /// Records one pyramid add filled at `price` with size `fraction`.
    pub fn add(&mut self, price: f64, fraction: f64, averaging: EntryAveraging) {
        self.adds += 1;
        self.entry_price = match averaging {
            EntryAveraging::Legacy => {
                (self.entry_price + price * fraction) / (1.0 + self.adds as f64 * 0.5)
            }
            EntryAveraging::Weighted => {
                (self.entry_price * self.units + price * fraction) / (self.units + fraction)
            }
        };
        self.units += fraction;
    }

    pub fn is_stopped(&self, low: f64) -> bool {
        low < self.stop
    }

    /// Fractional return if closed at `exit_price`.
    pub fn return_at(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) / self.entry_price
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub adds: usize,
    pub pl: f64,
}

impl ClosedTrade {
    /// Closes `position` at its stop.
    pub fn from_stop(position: &Position, exit_date: NaiveDate) -> Self {
        Self {
            entry_date: position.entry_date,
            exit_date,
            entry_price: position.entry_price,
            exit_price: position.stop,
            adds: position.adds,
            pl: position.return_at(position.stop),
        }
    }
}
