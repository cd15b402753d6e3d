
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Error,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

pub const DEFAULT_LOCK_FILE: &str = "lock.txt";
pub const DEFAULT_RESULTS_FILE: &str = "output.json";

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Shared database folder not found: {0}")]
    DatabaseNotFound(PathBuf),
    #[error("No database root was configured")]
    MissingDatabase,
    #[error("No workspace was configured")]
    MissingWorkspace,
    #[error("No executor was configured")]
    MissingExecutor,
    #[error("Globs were invalid")]
    InvalidGlobs(#[from] globset::Error),
    #[error("Failed to read config")]
    Read(#[from] Error),
    #[error("Failed to parse config")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(alias = "db")]
    pub database: DatabaseConfig,
    pub workspace: WorkspaceConfig,
    // external job executor, only required for `run`
    #[serde(default)]
    pub executor: Option<ExecutorConfig>,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// the cloud synced folder holding one subfolder per case
    pub root: PathBuf,
    #[serde(default = "default_lock_file")]
    pub lock_file: String,
    #[serde(default = "default_results_file")]
    pub results_file: String,
    /// write host, pid and time into the lock marker instead of leaving it empty
    #[serde(default)]
    pub record_owner: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// local folder cases are staged into
    pub path: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    // in seconds
    pub timeout: u64,
    // defaults to the number of cases pulled
    pub threads: Option<usize>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SeedConfig {
    #[serde(default = "default_seed_glob")]
    pub glob: String,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            glob: default_seed_glob(),
        }
    }
}

impl DatabaseConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            lock_file: default_lock_file(),
            results_file: default_results_file(),
            record_owner: false,
        }
    }
}

impl RunnerConfig {
    pub fn new(database: PathBuf, workspace: PathBuf) -> Self {
        Self {
            database: DatabaseConfig::new(database),
            workspace: WorkspaceConfig { path: workspace },
            executor: None,
            seed: SeedConfig::default(),
        }
    }

    /// load a YAML config from disk
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path)?;

        Ok(serde_yaml::from_reader(file)?)
    }

    /// compile the glob used for seeding new cases
    pub fn seed_matcher(&self) -> Result<GlobMatcher, ConfigErrors> {
        Ok(GlobBuilder::new(&self.seed.glob)
            .literal_separator(true)
            .build()?
            .compile_matcher())
    }

    /// Validate the whole config, returns true if any error was found
    ///
    /// Every problem is logged instead of stopping at the first one to make debugging easier.
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        if !self.database.root.is_dir() {
            error!(
                "Could not find the shared database at {}. Ensure the sync client is signed in and the folder is available",
                self.database.root.to_string_lossy()
            );
            contains_error = true;
        }

        for (key, marker) in [
            ("database.lock_file", &self.database.lock_file),
            ("database.results_file", &self.database.results_file),
        ] {
            if !is_plain_file_name(marker) {
                error!("{key} ({marker}) must be a plain file name");
                contains_error = true;
            }
        }

        if self.database.lock_file == self.database.results_file {
            error!("database.lock_file and database.results_file cannot be the same file");
            contains_error = true;
        }

        if let Err(error) = fs::create_dir_all(&self.workspace.path) {
            error!(
                "Failed to create workspace at {}: {error}",
                self.workspace.path.to_string_lossy()
            );
            contains_error = true;
        }

        if let Some(ref mut executor) = self.executor {
            if executor.timeout == 0 {
                error!("executor.timeout cannot be 0");
                contains_error = true;
            }

            if executor.threads == Some(0) {
                warn!("executor.threads is 0. Falling back to the number of pulled cases");
                executor.threads = None;
            }
        }

        if let Err(error) = self.seed_matcher() {
            error!("seed.glob ({}) is invalid: {error}", self.seed.glob);
            contains_error = true;
        }

        contains_error
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();

    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

fn default_lock_file() -> String {
    String::from(DEFAULT_LOCK_FILE)
}

fn default_results_file() -> String {
    String::from(DEFAULT_RESULTS_FILE)
}

fn default_seed_glob() -> String {
    String::from("*.{igs,json}")
}
