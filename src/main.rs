use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use basket_ledger::scenario::{self, Scenario};
use basket_ledger::units::normalized;

//==================== Аргументы ====================//

#[derive(Parser, Debug)]
#[command(name = "basket-ledger")]
#[command(about = "Replay basket ledger scenarios against an in-memory host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON scenario and print the final report
    Run {
        /// Scenario file
        scenario: PathBuf,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },
    /// Print the accounting day boundary a unix timestamp belongs to
    Normalize {
        /// Unix seconds
        timestamp: u64,
    },
}

//==================== Команды ====================//

fn run_cmd(path: PathBuf, pretty: bool) -> Result<(), String> {
    let scenario = Scenario::load(&path).map_err(|e| e.to_string())?;
    info!(path = %path.display(), actions = scenario.actions.len(), "scenario loaded");
    let report = scenario::run(&scenario).map_err(|e| e.to_string())?;
    info!(
        steps = report.steps.len(),
        failures = report.failures(),
        basket_value = report.basket_value,
        "scenario finished"
    );
    let out = if pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .map_err(|e| e.to_string())?;
    println!("{out}");
    Ok(())
}

fn normalize_cmd(timestamp: u64) {
    println!("{}", normalized(timestamp));
}

//==================== main ====================//

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(tracing::level_filters::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run { scenario, pretty } => run_cmd(scenario, pretty),
        Command::Normalize { timestamp } => {
            normalize_cmd(timestamp);
            Ok(())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
