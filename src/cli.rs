//! CLI definition and dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{
    BacktestConfig, DEFAULT_ADD_SIZE_FRACTIONS, DEFAULT_ATR_MULTIPLIER,
    DEFAULT_LOSS_FAILURE_THRESHOLD, DEFAULT_MAX_ADDS, DEFAULT_VOLUME_MULTIPLIER, VolumeFilter,
};
use crate::domain::config_validation::validate_backtest_config;
use crate::domain::error::TrendstopError;
use crate::domain::indicator::{
    DEFAULT_ATR_PERIOD, DEFAULT_MA_WINDOW, DEFAULT_VOLUME_WINDOW, IndicatorParams, IndicatorType,
};
use crate::domain::metrics::{Metrics, aggregate};
use crate::domain::position::EntryAveraging;
use crate::domain::universe::{DataWindow, UniverseError, UniverseRun, parse_codes, run_universe};
use crate::ports::config_port::{ConfigPort, get_flag, get_optional, get_parsed};
use crate::ports::data_port::DataPort;

const DEFAULT_DATA_DIR: &str = "data";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Parser, Debug)]
#[command(
    name = "trendstop",
    version,
    about = "ATR trailing-stop backtester with pyramiding"
)]
pub struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the backtest over the configured codes
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated codes, overriding the config
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Only test the final N bars of each code
        #[arg(long)]
        last: Option<usize>,
        /// Resolve config and data files without simulating
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file and print the resolved settings
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            code,
            data_dir,
            last,
            dry_run,
        } => {
            let opts = BacktestOptions {
                code: code.as_deref(),
                data_dir: data_dir.as_deref(),
                last,
            };
            if dry_run {
                run_dry_run(&config, &opts)
            } else {
                run_backtest(&config, &opts)
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Info { config, code } => run_info(&config, code.as_deref()),
    }
}

/// Command-line overrides for the `backtest` subcommand.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktestOptions<'a> {
    pub code: Option<&'a str>,
    pub data_dir: Option<&'a Path>,
    pub last: Option<usize>,
}

fn fail(e: &TrendstopError) -> ExitCode {
    error!("{e}");
    e.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Reads `[indicators]` and `[strategy]`, then validates the result.
pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, TrendstopError> {
    let indicators = IndicatorParams {
        atr_period: get_parsed(adapter, "indicators", "atr_period", DEFAULT_ATR_PERIOD)?,
        ma_window: get_parsed(adapter, "indicators", "ma_window", DEFAULT_MA_WINDOW)?,
        volume_window: get_parsed(adapter, "indicators", "volume_window", DEFAULT_VOLUME_WINDOW)?,
    };

    let add_size_fractions = match adapter.get_list("strategy", "add_size_fractions") {
        Some(items) => items
            .iter()
            .map(|item| {
                item.parse::<f64>().map_err(|_| {
                    TrendstopError::config_invalid(
                        "strategy",
                        "add_size_fractions",
                        format!("cannot parse '{item}'"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => DEFAULT_ADD_SIZE_FRACTIONS.to_vec(),
    };

    let volume_filter = if get_flag(adapter, "strategy", "volume_filter", false)? {
        Some(VolumeFilter {
            multiplier: get_parsed(
                adapter,
                "strategy",
                "volume_multiplier",
                DEFAULT_VOLUME_MULTIPLIER,
            )?,
        })
    } else {
        None
    };

    let config = BacktestConfig {
        indicators,
        atr_multiplier: get_parsed(adapter, "strategy", "atr_multiplier", DEFAULT_ATR_MULTIPLIER)?,
        pyramid_enabled: get_flag(adapter, "strategy", "pyramid", true)?,
        max_adds: get_parsed(adapter, "strategy", "max_adds", DEFAULT_MAX_ADDS)?,
        add_size_fractions,
        loss_failure_threshold: get_parsed(
            adapter,
            "strategy",
            "loss_failure_threshold",
            DEFAULT_LOSS_FAILURE_THRESHOLD,
        )?,
        entry_averaging: get_parsed(
            adapter,
            "strategy",
            "entry_averaging",
            EntryAveraging::default(),
        )?,
        volume_filter,
    };

    validate_backtest_config(&config)?;
    Ok(config)
}

fn parse_config_date(
    adapter: &dyn ConfigPort,
    key: &str,
) -> Result<Option<NaiveDate>, TrendstopError> {
    match adapter
        .get_string("backtest", key)
        .filter(|s| !s.trim().is_empty())
    {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
            .map(Some)
            .map_err(|_| {
                TrendstopError::config_invalid(
                    "backtest",
                    key,
                    "invalid date format (expected YYYY-MM-DD)",
                )
            }),
    }
}

/// Date bounds and `last_bars` from `[backtest]`; `last_override` wins over
/// the file.
pub fn build_data_window(
    adapter: &dyn ConfigPort,
    last_override: Option<usize>,
) -> Result<DataWindow, TrendstopError> {
    let mut window = DataWindow::default();
    if let Some(start) = parse_config_date(adapter, "start_date")? {
        window.start_date = start;
    }
    if let Some(end) = parse_config_date(adapter, "end_date")? {
        window.end_date = end;
    }
    if window.start_date > window.end_date {
        return Err(TrendstopError::config_invalid(
            "backtest",
            "end_date",
            "end_date is before start_date",
        ));
    }

    window.last_bars = match last_override {
        Some(n) => Some(n),
        None => get_optional(adapter, "backtest", "last_bars")?,
    };
    if window.last_bars == Some(0) {
        return Err(TrendstopError::config_invalid(
            "backtest",
            "last_bars",
            "must be at least 1",
        ));
    }
    Ok(window)
}

/// `--code` if given, else `[backtest] codes`, else `[backtest] code`.
pub fn resolve_codes(
    code_override: Option<&str>,
    adapter: &dyn ConfigPort,
) -> Result<Vec<String>, TrendstopError> {
    let raw = match code_override {
        Some(codes) => codes.to_string(),
        None => adapter
            .get_string("backtest", "codes")
            .or_else(|| adapter.get_string("backtest", "code"))
            .ok_or(UniverseError::NoCodes)?,
    };
    Ok(parse_codes(&raw)?)
}

pub fn resolve_data_dir(dir_override: Option<&Path>, adapter: &dyn ConfigPort) -> PathBuf {
    match dir_override {
        Some(dir) => dir.to_path_buf(),
        None => adapter
            .get_string("data", "dir")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
    }
}

fn format_date_bound(date: NaiveDate, unbounded: NaiveDate) -> String {
    if date == unbounded {
        "-".to_string()
    } else {
        date.to_string()
    }
}

/// Human-readable dump of the resolved settings.
pub fn format_settings(config: &BacktestConfig, window: &DataWindow, codes: &[String]) -> String {
    let ind = &config.indicators;
    let names: Vec<String> = ind.indicators().iter().map(|i| i.to_string()).collect();

    let mut lines = vec![
        format!("Codes:            {}", codes.join(", ")),
        format!(
            "Date range:       {} to {}",
            format_date_bound(window.start_date, NaiveDate::MIN),
            format_date_bound(window.end_date, NaiveDate::MAX)
        ),
    ];
    if let Some(n) = window.last_bars {
        lines.push(format!("Last bars:        {n}"));
    }
    lines.push(format!("Indicators:       {}", names.join(", ")));
    lines.push(format!("Warmup:           {} bars", config.warmup()));
    lines.push(format!("ATR multiplier:   {}", config.atr_multiplier));

    lines.push(if config.pyramid_enabled {
        let fractions: Vec<String> = config
            .add_size_fractions
            .iter()
            .map(|f| f.to_string())
            .collect();
        format!(
            "Pyramiding:       up to {} adds [{}], {} averaging",
            config.max_adds,
            fractions.join(", "),
            config.entry_averaging
        )
    } else {
        "Pyramiding:       off".to_string()
    });
    lines.push(match config.volume_filter {
        Some(filter) => format!(
            "Volume filter:    volume > {} x {}",
            filter.multiplier,
            IndicatorType::VolumeSma(ind.volume_window)
        ),
        None => "Volume filter:    off".to_string(),
    });
    lines.push(format!(
        "Failure below:    {:.1}%",
        config.loss_failure_threshold * 100.0
    ));

    join_lines(&lines)
}

fn join_lines(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn metrics_lines(metrics: &Metrics) -> [String; 4] {
    [
        format!("Trades:           {}", metrics.trade_count),
        format!("Failures:         {}", metrics.failure_count),
        format!("Total Loss:       {:.2}%", metrics.total_loss_pct),
        format!("Average P/L:      {:.2}%", metrics.avg_pl_pct),
    ]
}

/// Per-code lines followed by aggregate metrics and skipped codes.
pub fn format_summary(run: &UniverseRun, loss_failure_threshold: f64) -> String {
    let mut lines = vec!["=== Per-Code Results ===".to_string()];
    for cr in &run.codes {
        let m = &cr.metrics;
        let open = if cr.open_position { " (position open)" } else { "" };
        lines.push(format!(
            "  {}: {} bars, {} trades, {} failures, total loss {:.2}%, avg P/L {:.2}%{open}",
            cr.code, cr.bars, m.trade_count, m.failure_count, m.total_loss_pct, m.avg_pl_pct
        ));
    }

    lines.push(String::new());
    lines.push("=== Aggregate Results ===".to_string());
    lines.extend(metrics_lines(&aggregate(&run.results, loss_failure_threshold)));

    if !run.skipped.is_empty() {
        lines.push(String::new());
        lines.push("=== Skipped ===".to_string());
        lines.extend(run.skipped.iter().map(|s| format!("  {}: {}", s.code, s.reason)));
    }
    join_lines(&lines)
}

/// Everything a backtest needs, read from one config file.
struct Resolved {
    config: BacktestConfig,
    window: DataWindow,
    codes: Vec<String>,
    data_dir: PathBuf,
}

fn resolve(adapter: &dyn ConfigPort, opts: &BacktestOptions) -> Result<Resolved, TrendstopError> {
    Ok(Resolved {
        config: build_backtest_config(adapter)?,
        window: build_data_window(adapter, opts.last)?,
        codes: resolve_codes(opts.code, adapter)?,
        data_dir: resolve_data_dir(opts.data_dir, adapter),
    })
}

fn run_backtest(config_path: &Path, opts: &BacktestOptions) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let resolved = match resolve(&adapter, opts) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    let data_port = CsvAdapter::new(resolved.data_dir.clone());
    run_backtest_pipeline(
        &data_port,
        &resolved.codes,
        &resolved.window,
        &resolved.config,
    )
}

/// Runs every code and prints the summary to stdout.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    codes: &[String],
    window: &DataWindow,
    config: &BacktestConfig,
) -> ExitCode {
    info!(codes = codes.len(), warmup = config.warmup(), "starting backtest");
    let run = match run_universe(data_port, codes, window, config) {
        Ok(run) => run,
        Err(e) => return fail(&e),
    };
    for skipped in &run.skipped {
        warn!(code = %skipped.code, reason = %skipped.reason, "code skipped");
    }
    print!("{}", format_summary(&run, config.loss_failure_threshold));
    ExitCode::SUCCESS
}

fn run_dry_run(config_path: &Path, opts: &BacktestOptions) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let resolved = match resolve(&adapter, opts) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    print!(
        "{}",
        format_settings(&resolved.config, &resolved.window, &resolved.codes)
    );
    println!("Data directory:   {}", resolved.data_dir.display());

    let data_port = CsvAdapter::new(resolved.data_dir.clone());
    let mut found = 0;
    for code in &resolved.codes {
        match data_port.get_data_range(code) {
            Ok(Some((first, last, count))) => {
                found += 1;
                println!("  {code}: {first} to {last} ({count} bars)");
            }
            Ok(None) => warn!(code = %code, "no data file"),
            Err(e) => return fail(&e),
        }
    }
    if found == 0 {
        return fail(&TrendstopError::from(UniverseError::AllCodesFailed));
    }

    println!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let resolved = match resolve(&adapter, &BacktestOptions::default()) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    print!(
        "{}",
        format_settings(&resolved.config, &resolved.window, &resolved.codes)
    );
    println!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_dir = resolve_data_dir(None, &adapter);
    let symbols = match CsvAdapter::new(data_dir.clone()).list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    if symbols.is_empty() {
        warn!(dir = %data_dir.display(), "no symbols found");
    } else {
        for symbol in &symbols {
            println!("{symbol}");
        }
        info!(count = symbols.len(), "symbols found");
    }
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, code: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_port = CsvAdapter::new(resolve_data_dir(None, &adapter));

    // Without --code or configured codes, report every file in the directory.
    let codes = match resolve_codes(code, &adapter) {
        Ok(codes) => codes,
        Err(TrendstopError::Universe(UniverseError::NoCodes)) => match data_port.list_symbols() {
            Ok(symbols) => symbols,
            Err(e) => return fail(&e),
        },
        Err(e) => return fail(&e),
    };

    for code in &codes {
        match data_port.get_data_range(code) {
            Ok(Some((first, last, count))) => {
                println!("{code}: {first} to {last} ({count} bars)");
            }
            Ok(None) => println!("{code}: no data"),
            Err(e) => return fail(&e),
        }
    }
    ExitCode::SUCCESS
}
