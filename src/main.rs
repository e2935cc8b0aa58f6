mod cli;
mod commands;
mod output;
mod progress;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::ExecutionFailed;
use engine::{EngineError, ErrorCategory, ProviderError};
use std::io;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        Command::Bootstrap(args) => commands::bootstrap::run(args),
        Command::Preview(args) => commands::preview::run(args),
        Command::Commit(args) => commands::commit::run(args),
        Command::Align(args) => commands::align::run(args),
        Command::Dismantle(args) => commands::dismantle::run(args),
        Command::Docs(args) => commands::docs::run(args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "runestone", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(err) = result {
        ui::error(&format!("{err:#}"));
        std::process::exit(exit_code(&err));
    }
}

/// `RUNESTONE_LOG_LEVEL` wins over the verbosity flags.
fn init_logging(cli: &Cli) {
    let from_env = std::env::var("RUNESTONE_LOG_LEVEL")
        .ok()
        .and_then(|level| match level.to_lowercase().as_str() {
            "debug" => Some(log::LevelFilter::Debug),
            "info" => Some(log::LevelFilter::Info),
            "warn" => Some(log::LevelFilter::Warn),
            "error" => Some(log::LevelFilter::Error),
            _ => None,
        });

    let level = from_env.unwrap_or(match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    });

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            level
        })
        .format_timestamp(None)
        .init();
}

/// 0 success, 1 general failure, 2 configuration, 3 provider, 4 resource.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(engine_error) = err.downcast_ref::<EngineError>() {
        return match engine_error.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Provider => 3,
            ErrorCategory::Resource => 4,
        };
    }
    if err.downcast_ref::<ProviderError>().is_some() {
        return 3;
    }
    if err.downcast_ref::<ExecutionFailed>().is_some() {
        return 4;
    }
    1
}
