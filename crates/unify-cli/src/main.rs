//! `unify` binary: argument parsing, logging setup, and exit-code mapping.
//!
//! Exit codes: 0 success, 1 build failure (or a tripped `--fail-on`),
//! 2 security or path-traversal violation.

mod args;
mod report;
mod scaffold;
mod serve;
mod watch;

use args::{Cli, Command, ReportFormat};
use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use unify_core::{BuildError, BuildReport, FailOn, LogLevel, Orchestrator};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let (command, build_args) = match cli.command {
        Some(Command::Init(init)) => {
            init_tracing(LogLevel::Info);
            scaffold::run(&init)?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Command::Build(args)) => (Verb::Build, args),
        Some(Command::Serve(args)) => (Verb::Serve, args),
        Some(Command::Watch(args)) => (Verb::Watch, args),
        None => (Verb::Build, cli.build),
    };

    let (config, warnings) = build_args.to_config()?;
    init_tracing(config.log_level);
    for warning in &warnings {
        tracing::warn!("{}", warning.message);
    }

    match command {
        Verb::Build => build_once(config, build_args.report),
        Verb::Watch => watch::run(config).map(|()| ExitCode::SUCCESS),
        Verb::Serve => serve::run(config).map(|()| ExitCode::SUCCESS),
    }
}

enum Verb {
    Build,
    Watch,
    Serve,
}

fn build_once(
    config: unify_core::BuildConfig,
    format: ReportFormat,
) -> anyhow::Result<ExitCode> {
    let fail_on = config.fail_on.clone();
    let log_level = config.log_level;
    let mut orch = match Orchestrator::new(config) {
        Ok(orch) => orch,
        Err(err) => return Ok(fatal(err)),
    };
    let report = match orch.build() {
        Ok(report) => report,
        Err(err) => return Ok(fatal(err)),
    };
    report::print(&report, format, log_level);
    Ok(ExitCode::from(exit_code_for(&report, fail_on.as_ref())))
}

fn fatal(err: BuildError) -> ExitCode {
    eprintln!("{} {err}", "error:".red().bold());
    if err.is_security() {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}

/// `--fail-on` evaluation. A tripped security selector (or a security
/// code) maps to exit 2; any other tripped selector to exit 1.
fn exit_code_for(report: &BuildReport, fail_on: Option<&FailOn>) -> u8 {
    if !report.should_fail(fail_on) {
        return 0;
    }
    let security = match fail_on {
        Some(FailOn::Security) => true,
        Some(FailOn::Code(code)) => code == "U401" || code == "U402",
        _ => false,
    };
    if security { 2 } else { 1 }
}

fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("unify={},unify_core={}", level.as_str(), level.as_str())));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}
