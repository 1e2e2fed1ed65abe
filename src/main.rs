use clap::Parser;
use portfolio_etl::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
