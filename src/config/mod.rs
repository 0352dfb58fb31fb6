//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::subs::SubsConfig;

mod cli;

pub use cli::{CliArgs, Command, ReplayArgs, SubsOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "barkeep";
const ENV_PREFIX: &str = "BARKEEP";
// One year; anything longer is a typo rather than a policy.
const MAX_EXPIRATION_WINDOW_MINUTES: u64 = 366 * 24 * 60;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub subs: SubsSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SubsSettings {
    pub capacity_limit: NonZeroUsize,
    pub expiration_window_minutes: u64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Replay(args) => raw.apply_subs_overrides(&args.overrides),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    subs: RawSubsSettings,
}

impl RawSettings {
    fn apply_subs_overrides(&mut self, overrides: &SubsOverrides) {
        if let Some(limit) = overrides.capacity_limit {
            self.subs.capacity_limit = Some(limit);
        }
        if let Some(minutes) = overrides.expiration_window_minutes {
            self.subs.expiration_window_minutes = Some(minutes);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, subs } = raw;

        let logging = build_logging_settings(logging)?;
        let subs = build_subs_settings(subs)?;

        Ok(Self { logging, subs })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_subs_settings(subs: RawSubsSettings) -> Result<SubsSettings, LoadError> {
    let defaults = SubsConfig::default();
    let capacity_limit = match subs.capacity_limit {
        Some(value) => non_zero_usize(value, "subs.capacity_limit")?,
        None => defaults.capacity_limit_non_zero(),
    };

    let expiration_window_minutes = subs
        .expiration_window_minutes
        .unwrap_or(defaults.expiration_window_minutes);
    if expiration_window_minutes == 0 {
        return Err(LoadError::invalid(
            "subs.expiration_window_minutes",
            "must be greater than zero",
        ));
    }
    if expiration_window_minutes > MAX_EXPIRATION_WINDOW_MINUTES {
        return Err(LoadError::invalid(
            "subs.expiration_window_minutes",
            format!("must not exceed {MAX_EXPIRATION_WINDOW_MINUTES}"),
        ));
    }

    Ok(SubsSettings {
        capacity_limit,
        expiration_window_minutes,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSubsSettings {
    capacity_limit: Option<u64>,
    expiration_window_minutes: Option<u64>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
