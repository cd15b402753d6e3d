mod args;

use args::{Cli, Cmd, ReportFormat};
use casesync_runner::{
    config::{ConfigErrors, RunnerConfig},
    executors::{ExecutorError, Executors},
    manager::{CaseManager, ManagerError},
    repository::RepositoryError,
};
use clap::Parser;
use std::process::exit;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("Refusing to force release without --yes")]
    NotConfirmed,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match load_config(&cli) {
        Ok(config) => config,
        Err(error) => {
            error!("Failed to load config: {error}");
            exit(1)
        }
    };

    if config.preflight_checks() {
        error!("Config contains errors, aborting");
        exit(1)
    }

    let manager = match CaseManager::load(&config) {
        Ok(manager) => manager,
        Err(error) => {
            error!("{error}");
            exit(1)
        }
    };

    if let Err(error) = run(cli.cmd, &config, &manager) {
        error!("{error}");
        exit(1)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// config file first, command line flags take precedence
fn load_config(cli: &Cli) -> Result<RunnerConfig, ConfigErrors> {
    let mut config = match (&cli.config, &cli.database, &cli.workspace) {
        (Some(path), _, _) => RunnerConfig::load(path)?,
        (None, Some(database), Some(workspace)) => {
            RunnerConfig::new(database.clone(), workspace.clone())
        }
        (None, None, _) => return Err(ConfigErrors::MissingDatabase),
        (None, Some(_), None) => return Err(ConfigErrors::MissingWorkspace),
    };

    if let Some(ref database) = cli.database {
        config.database.root = database.clone();
    }

    if let Some(ref workspace) = cli.workspace {
        config.workspace.path = workspace.clone();
    }

    Ok(config)
}

fn run(cmd: Cmd, config: &RunnerConfig, manager: &CaseManager) -> Result<(), CliError> {
    match cmd {
        Cmd::Status => {
            for case in manager.scan()? {
                println!("{case}");
            }
        }
        Cmd::Pull(args) => {
            let cases = manager.reserve_next(args.n, !args.no_lock)?;

            if cases.is_empty() {
                warn!("No cases available");
            }

            for case in cases {
                if let Some(local_location) = case.local_location {
                    println!("{}", local_location.to_string_lossy());
                }
            }
        }
        Cmd::Release => {
            manager.release_all()?;
        }
        Cmd::ForceRelease(args) => {
            if !args.yes {
                return Err(CliError::NotConfirmed);
            }

            manager.force_release_all()?;
        }
        Cmd::Publish(args) => {
            let mut case = manager.staged(&args.name)?;
            let report = manager.publish_result(&mut case)?;

            info!(
                "Uploaded {} files, {} failed",
                report.copied.len(),
                report.failed.len()
            );
        }
        Cmd::Abandon(args) => {
            let mut case = manager.staged(&args.name)?;
            manager.abandon(&mut case);
        }
        Cmd::Report(args) => {
            let records = manager.report()?;
            let output = match args.format {
                ReportFormat::Json => serde_json::to_string_pretty(&records).unwrap_or_log(),
                ReportFormat::Yaml => serde_yaml::to_string(&records).unwrap_or_log(),
            };

            println!("{output}");
        }
        Cmd::Seed(args) => {
            let matcher = config.seed_matcher()?;

            for name in manager.repository().seed(&args.project, &matcher)? {
                println!("{name}");
            }
        }
        Cmd::Run(args) => {
            let summary = Executors::load(config)?.execute(manager, args.n)?;

            println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_log());
        }
    }

    Ok(())
}
