use std::{
    io::{self, Write},
    process,
};

use barkeep::{
    config::{self, ReplayArgs},
    error::AppError,
    infra::{error::InfraError, telemetry},
    replay,
    subs::SubsConfig,
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        config::Command::Replay(args) => run_replay(&settings, &args),
    }
}

fn run_replay(settings: &config::Settings, args: &ReplayArgs) -> Result<(), AppError> {
    let report = replay::run_file(&args.file, SubsConfig::from(&settings.subs))?;
    let json = report.to_json(args.pretty)?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").map_err(InfraError::from)?;
    Ok(())
}
