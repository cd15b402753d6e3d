use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "casesync", version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Shared database folder, overrides database.root
    #[arg(long, value_name = "DIR")]
    pub database: Option<PathBuf>,
    /// Local workspace folder, overrides workspace.path
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Show the status of every case
    Status,
    /// Reserve and download cases that are not started yet
    Pull(PullArgs),
    /// Release every reserved case
    Release,
    /// Release every case regardless of who reserved it
    ForceRelease(ForceReleaseArgs),
    /// Upload the results of a staged case and release it
    Publish(CaseArgs),
    /// Release a staged case after a failed run
    Abandon(CaseArgs),
    /// Print parameters and results of every case
    Report(ReportArgs),
    /// Create cases from the geometry and parameter files of a project folder
    Seed(SeedArgs),
    /// Reserve cases and run the configured executor on them
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Number of cases to pull
    pub n: usize,
    /// Download without writing a reservation marker
    #[arg(long)]
    pub no_lock: bool,
}

#[derive(Args, Debug)]
pub struct ForceReleaseArgs {
    /// Confirm that locks of other users may be removed
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct CaseArgs {
    /// Name of the case folder
    pub name: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[arg(long, value_enum, default_value_t)]
    pub format: ReportFormat,
}

#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Folder containing the generated geometry and parameter files
    pub project: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of cases to run
    pub n: usize,
}
