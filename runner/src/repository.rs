pub mod transfer;

#[cfg(test)]
mod repository_test;

use crate::{
    case::{owner::LockOwner, Case, CaseStatus},
    config::{ConfigErrors, DatabaseConfig, WorkspaceConfig},
};
use globset::GlobMatcher;
use ignore::WalkBuilder;
use itertools::Itertools;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    ffi::{OsStr, OsString},
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use transfer::{copy_folder, TransferPlan, TransferReport};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Failed to list folder {path:?}: {source}")]
    List { path: PathBuf, source: io::Error },
    #[error("Failed to copy case {name}: {source}")]
    Transfer { name: String, source: io::Error },
    #[error("Case {0} has no local copy")]
    NotStaged(String),
}

/// name -> numeric value, used for both parameter records and results
pub type ValueMap = BTreeMap<String, f64>;

/// Read-only view of one case for reports
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub name: String,
    pub status: CaseStatus,
    pub parameters: Option<ValueMap>,
    pub results: Option<ValueMap>,
}

/// Access to the shared case database and the local workspace
#[derive(Debug, Clone)]
pub struct CaseRepository {
    root: PathBuf,
    workspace: PathBuf,
    lock_file: String,
    results_file: String,
}

impl CaseRepository {
    /// Open the database, a missing root is a configuration error and nothing else is attempted
    pub fn open(
        database: &DatabaseConfig,
        workspace: &WorkspaceConfig,
    ) -> Result<Self, ConfigErrors> {
        if !database.root.is_dir() {
            return Err(ConfigErrors::DatabaseNotFound(database.root.clone()));
        }

        Ok(Self {
            root: database.root.clone(),
            workspace: workspace.path.clone(),
            lock_file: database.lock_file.clone(),
            results_file: database.results_file.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn results_file(&self) -> &str {
        &self.results_file
    }

    /// Snapshot every case folder in the database
    ///
    /// The order is whatever the filesystem returns. Folders that vanish or can't be read while
    /// scanning are skipped.
    #[instrument(skip(self), level = "debug")]
    pub fn scan(&self) -> Result<Vec<Case>, RepositoryError> {
        let entries = fs::read_dir(&self.root).map_err(|source| RepositoryError::List {
            path: self.root.clone(),
            source,
        })?;

        let cases = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!(error = ?error, "Failed to read database entry, skipping");
                    None
                }
            })
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| match entry.file_name().into_string() {
                Ok(name) => self.inspect(name),
                Err(name) => {
                    warn!(name = ?name, "Case folder name is not valid unicode, skipping");
                    None
                }
            })
            .collect_vec();

        debug!("Found {} cases", cases.len());

        Ok(cases)
    }

    /// build a single case from its folder, None if it doesn't exist (anymore)
    pub fn case(&self, name: &str) -> Option<Case> {
        let path = self.root.join(name);

        if path.is_dir() {
            self.inspect(name.to_string())
        } else {
            None
        }
    }

    fn inspect(&self, name: String) -> Option<Case> {
        let remote_location = self.root.join(&name);
        let children: HashSet<OsString> = match fs::read_dir(&remote_location) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name())
                .collect(),
            Err(error) => {
                warn!(case = %name, error = ?error, "Failed to list case folder, skipping");
                return None;
            }
        };

        let has_lock = children.contains(OsStr::new(&self.lock_file));
        let has_results = children.contains(OsStr::new(&self.results_file));

        let mut case = Case::new(
            name,
            remote_location,
            self.lock_file.as_str(),
            CaseStatus::from_markers(has_lock, has_results),
            has_lock,
        );

        if has_lock {
            // the marker may be removed by another worker in the meantime
            case.owner = fs::read(case.lock_path())
                .ok()
                .and_then(|contents| LockOwner::parse(&contents));
        }

        Some(case)
    }

    /// local folder a case is staged into
    pub fn local_path(&self, name: &str) -> PathBuf {
        self.workspace.join(name)
    }

    /// Copy a case from the database into a fresh folder in the workspace
    ///
    /// Leftovers of an earlier attempt are removed first, including a local results marker.
    #[instrument(skip(self, case), fields(case = %case.name), level = "debug")]
    pub fn download(&self, case: &mut Case) -> Result<TransferReport, RepositoryError> {
        let destination = self.local_path(&case.name);

        match fs::remove_dir_all(&destination) {
            Ok(()) => debug!(path = ?destination, "Removed previous local copy"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RepositoryError::Transfer {
                    name: case.name.clone(),
                    source,
                })
            }
        }

        let report = copy_folder(&case.remote_location, &destination, TransferPlan::default())
            .map_err(|source| RepositoryError::Transfer {
                name: case.name.clone(),
                source,
            })?;

        log_report(&case.name, "download", &report);
        case.set_local_location(report.destination.clone());

        Ok(report)
    }

    /// Copy the local copy of a case back into the database
    ///
    /// The reservation marker is never uploaded and the results marker is copied last, so a
    /// case only shows up as done once its payload is in place.
    #[instrument(skip(self, case), fields(case = %case.name), level = "debug")]
    pub fn upload(&self, case: &Case) -> Result<TransferReport, RepositoryError> {
        let source = case
            .local_location
            .as_ref()
            .ok_or_else(|| RepositoryError::NotStaged(case.name.clone()))?;

        let plan = TransferPlan {
            exclude: Some(OsStr::new(&self.lock_file)),
            last: Some(OsStr::new(&self.results_file)),
        };
        let report = copy_folder(source, &case.remote_location, plan).map_err(|source| {
            RepositoryError::Transfer {
                name: case.name.clone(),
                source,
            }
        })?;

        log_report(&case.name, "upload", &report);

        Ok(report)
    }

    /// Read the parameter record and results of a case, never touches any marker
    pub fn record(&self, case: &Case) -> CaseRecord {
        let parameters = read_json(&case.remote_location.join(format!("{}.json", case.name)));
        let results = if case.status == CaseStatus::Done {
            read_json(&case.remote_location.join(&self.results_file))
        } else {
            None
        };

        CaseRecord {
            name: case.name.clone(),
            status: case.status,
            parameters,
            results,
        }
    }

    /// Publish new cases from the files of a project folder
    ///
    /// Every matching file lands in a case folder named after its file stem, so the geometry and
    /// the parameter record of one design end up together. Returns the touched case names.
    #[instrument(skip(self, matcher), level = "debug")]
    pub fn seed(
        &self,
        project: &Path,
        matcher: &GlobMatcher,
    ) -> Result<BTreeSet<String>, RepositoryError> {
        if !project.is_dir() {
            return Err(RepositoryError::List {
                path: project.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "project folder not found"),
            });
        }

        let mut cases = BTreeSet::new();

        for entry in WalkBuilder::new(project)
            .max_depth(Some(1))
            .standard_filters(false)
            .build()
        {
            let path = match entry {
                Ok(entry) => entry.into_path(),
                Err(error) => {
                    warn!(error = ?error, "Failed to read project entry, skipping");
                    continue;
                }
            };

            let file_name = match path.file_name() {
                Some(file_name) if path.is_file() && matcher.is_match(file_name) => file_name,
                _ => continue,
            };

            let name = match path.file_stem().and_then(OsStr::to_str) {
                Some(stem) if !stem.is_empty() => stem.to_string(),
                _ => {
                    warn!(path = ?path, "Seed file has no usable name, skipping");
                    continue;
                }
            };

            let destination = self.root.join(&name);

            if let Err(error) = fs::create_dir_all(&destination) {
                warn!(case = %name, error = ?error, "Failed to create case folder: {error}");
                continue;
            }

            match fs::copy(&path, destination.join(file_name)) {
                Ok(_) => {
                    info!(case = %name, file = ?file_name, "Seeded file");
                    cases.insert(name);
                }
                Err(error) => warn!(path = ?path, error = ?error, "Failed to seed file: {error}"),
            }
        }

        Ok(cases)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
        Err(error) => {
            warn!(path = ?path, error = ?error, "Failed to read record");
            return None;
        }
    };

    match serde_json::from_slice(&contents) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(path = ?path, error = ?error, "Failed to parse record: {error}");
            None
        }
    }
}

fn log_report(name: &str, direction: &str, report: &TransferReport) {
    if report.is_complete() {
        info!(
            case = %name,
            "Finished {direction} of {} files",
            report.copied.len()
        );
    } else {
        warn!(
            case = %name,
            failed = ?report.failed.iter().map(|(file, _)| file).collect_vec(),
            "Finished {direction} with {} of {} files missing",
            report.failed.len(),
            report.failed.len() + report.copied.len()
        );
    }
}
