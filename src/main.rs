use clap::Parser;
use trendstop::cli::{Cli, run};
use trendstop::telemetry::{init_logging, level_for_verbosity};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(level_for_verbosity(cli.verbose));
    run(cli)
}
