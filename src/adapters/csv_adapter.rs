//! CSV file data adapter.
//!
//! One file per symbol, `<base_path>/<CODE>.csv`, with a header row naming
//! `date, open, high, low, close, volume` in any order and case. File names
//! match codes case-insensitively. Dates may be ISO (`2025-07-22`) or exchange
//! style (`Jul 22, 2025`, quoted or not). Rows are returned oldest first
//! regardless of file order.

use crate::domain::error::TrendstopError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

const REQUIRED_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%b %d, %Y", "%m/%d/%Y"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// `<CODE>.csv`, falling back to a case-insensitive scan of the directory.
    fn find_csv(&self, code: &str) -> Result<Option<PathBuf>, TrendstopError> {
        let exact = self.base_path.join(format!("{}.csv", code));
        if exact.is_file() {
            return Ok(Some(exact));
        }
        let Ok(entries) = fs::read_dir(&self.base_path) else {
            return Ok(None);
        };
        for entry in entries {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            let stem_matches = path
                .file_stem()
                .is_some_and(|stem| stem.to_string_lossy().eq_ignore_ascii_case(code));
            if is_csv && stem_matches && path.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    fn read_code(&self, code: &str) -> Result<Vec<OhlcvBar>, TrendstopError> {
        let Some(path) = self.find_csv(code)? else {
            return Err(TrendstopError::NoData {
                code: code.to_string(),
            });
        };
        let file = fs::File::open(&path)?;
        read_bars(file, &path.display().to_string())
    }
}

/// Column positions resolved from the header row.
struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord, source_name: &str) -> Result<Self, TrendstopError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| TrendstopError::MissingColumn {
                    source_name: source_name.to_string(),
                    column: name.to_string(),
                })
        };
        let [date, open, high, low, close, volume] = REQUIRED_COLUMNS;
        Ok(Self {
            date: find(date)?,
            open: find(open)?,
            high: find(high)?,
            low: find(low)?,
            close: find(close)?,
            volume: find(volume)?,
        })
    }
}

/// Parses bars from any CSV reader and sorts them ascending by date.
///
/// Duplicate dates are kept; the backtest ordering check rejects them.
pub fn read_bars<R: Read>(reader: R, source_name: &str) -> Result<Vec<OhlcvBar>, TrendstopError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| TrendstopError::Data {
        reason: format!("{source_name}: {e}"),
    })?;
    let header_len = headers.len();
    let cols = Columns::from_headers(headers, source_name)?;

    let mut bars = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        // Header is line 1.
        let row = i + 2;
        let record = result.map_err(|e| TrendstopError::Data {
            reason: format!("{source_name}: CSV parse error: {e}"),
        })?;
        let invalid = |reason: String| TrendstopError::InvalidBar {
            source_name: source_name.to_string(),
            row,
            reason,
        };
        let fields = join_split_date(&record, header_len, cols.date);
        if fields.len() != header_len {
            return Err(invalid(format!(
                "expected {header_len} fields, found {}",
                fields.len()
            )));
        }
        let field = |idx: usize| fields.get(idx).map_or("", String::as_str);

        let date = parse_date(field(cols.date))
            .ok_or_else(|| invalid(format!("invalid date '{}'", field(cols.date))))?;

        let price = |idx: usize, name: &str| -> Result<f64, TrendstopError> {
            let raw = field(idx);
            match raw.replace(',', "").parse::<f64>() {
                Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
                _ => Err(invalid(format!("invalid {name} '{raw}'"))),
            }
        };
        let open = price(cols.open, "open")?;
        let high = price(cols.high, "high")?;
        let low = price(cols.low, "low")?;
        let close = price(cols.close, "close")?;

        if low > high {
            return Err(invalid(format!("low {low} above high {high}")));
        }

        let raw_volume = field(cols.volume);
        let volume = raw_volume
            .replace(',', "")
            .parse::<u64>()
            .map_err(|_| invalid(format!("invalid volume '{raw_volume}'")))?;

        bars.push(OhlcvBar {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

/// Rejoins an unquoted `Jul 22, 2025` date that the comma split in two.
fn join_split_date(record: &csv::StringRecord, header_len: usize, date_col: usize) -> Vec<String> {
    let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
    if fields.len() == header_len + 1 && date_col + 1 < fields.len() {
        let joined = format!("{}, {}", fields[date_col], fields[date_col + 1]);
        if NaiveDate::parse_from_str(&joined, "%b %d, %Y").is_ok() {
            fields[date_col] = joined;
            fields.remove(date_col + 1);
        }
    }
    fields
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, TrendstopError> {
        let mut bars = self.read_code(code)?;
        bars.retain(|b| b.date >= start_date && b.date <= end_date);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrendstopError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TrendstopError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if !is_csv {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                symbols.push(stem.to_string_lossy().into_owned());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TrendstopError> {
        let bars = match self.read_code(code) {
            Ok(bars) => bars,
            Err(TrendstopError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}
