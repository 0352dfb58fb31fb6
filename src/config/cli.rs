use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the barkeep binary.
#[derive(Debug, Parser)]
#[command(
    name = "barkeep",
    version,
    about = "Subscription cache tooling for the bar point-of-sale client"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BARKEEP_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Replay a subscription script against an in-memory store and print the
    /// resulting cache state as JSON.
    Replay(ReplayArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub overrides: SubsOverrides,

    /// Pretty-print the JSON report.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub pretty: bool,

    /// Replay script (TOML).
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SubsOverrides {
    /// Override the maximum number of tracked subscriptions.
    #[arg(long = "subs-capacity-limit", value_name = "COUNT")]
    pub capacity_limit: Option<u64>,

    /// Override the expiration window in minutes.
    #[arg(long = "subs-expiration-minutes", value_name = "MINUTES")]
    pub expiration_window_minutes: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
