use crate::output::OutputFormat;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "runestone")]
#[command(version)]
#[command(about = "Declarative, drift-aware infrastructure reconciliation", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install providers, load modules, and validate the configuration
    Bootstrap(CommonArgs),

    /// Preview changes and detect drift without touching anything
    Preview(CommonArgs),

    /// Apply infrastructure changes in dependency order
    Commit(CommitArgs),

    /// Reconcile drift, continuously or once
    Align(AlignArgs),

    /// Destroy managed resources in reverse dependency order
    Dismantle(DismantleArgs),

    /// Generate reference documentation for the configuration format
    Docs(DocsArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct CommonArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "infra.yaml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,
}

#[derive(Args)]
pub struct CommitArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Show the execution plan (DAG levels) before running
    #[arg(long)]
    pub graph: bool,

    /// Skip interactive approval
    #[arg(long)]
    pub auto_approve: bool,
}

#[derive(Args)]
pub struct AlignArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Run alignment once instead of continuously
    #[arg(long)]
    pub once: bool,

    /// Interval between alignment ticks (ignored with --once)
    #[arg(long, default_value = "5m", value_parser = parse_duration)]
    pub interval: Duration,
}

#[derive(Args)]
pub struct DismantleArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Skip interactive approval
    #[arg(long)]
    pub auto_approve: bool,

    /// Keep deleting later levels even when a level fails
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct DocsArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "infra.yaml")]
    pub config: String,

    /// Write the generated documentation to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Parse durations like "30s", "5m", "1h", or bare seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let (number, unit) = match input.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => input.split_at(pos),
        None => (input, "s"),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration: '{input}'"))?;

    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => return Err(format!("unknown duration unit: '{other}'")),
    };

    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[test]
    fn cli_parses_typical_invocations() {
        use clap::Parser;

        let cli = Cli::parse_from(["runestone", "commit", "--auto-approve", "--graph"]);
        match cli.command {
            Command::Commit(args) => {
                assert!(args.auto_approve);
                assert!(args.graph);
                assert_eq!(args.common.config, "infra.yaml");
            }
            _ => panic!("expected commit"),
        }

        let cli = Cli::parse_from([
            "runestone",
            "align",
            "--interval",
            "30s",
            "--config",
            "prod.yaml",
        ]);
        match cli.command {
            Command::Align(args) => {
                assert!(!args.once);
                assert_eq!(args.interval, Duration::from_secs(30));
                assert_eq!(args.common.config, "prod.yaml");
            }
            _ => panic!("expected align"),
        }
    }
}
