pub mod reservation;


use crate::{
    case::{owner::LockOwner, Case, CaseStatus},
    config::{ConfigErrors, RunnerConfig},
    repository::{transfer::TransferReport, CaseRecord, CaseRepository, RepositoryError},
};
use itertools::Itertools;
use std::ffi::OsStr;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("At least one case has to be requested")]
    InvalidCount,
    #[error("Case {0} was not found in the database")]
    UnknownCase(String),
    #[error("Case {0} has no results marker in its local copy")]
    MissingResults(String),
    #[error("Results marker of case {0} could not be uploaded")]
    ResultsNotPublished(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Coordinates reservations of cases between workers that only share the database folder
///
/// Reservations are advisory. Two workers scanning within the propagation delay of the sync
/// client can both claim the same case, nothing here detects or prevents that.
#[derive(Debug, Clone)]
pub struct CaseManager {
    repository: CaseRepository,
    record_owner: bool,
}

impl CaseManager {
    pub fn new(repository: CaseRepository, record_owner: bool) -> Self {
        Self {
            repository,
            record_owner,
        }
    }

    pub fn load(config: &RunnerConfig) -> Result<Self, ConfigErrors> {
        Ok(Self::new(
            CaseRepository::open(&config.database, &config.workspace)?,
            config.database.record_owner,
        ))
    }

    pub fn repository(&self) -> &CaseRepository {
        &self.repository
    }

    pub fn scan(&self) -> Result<Vec<Case>, ManagerError> {
        Ok(self.repository.scan()?)
    }

    /// Reserve and stage up to `n` cases that are not started yet
    ///
    /// Cases are taken in scan order. With `lock` set the marker is written before the download
    /// starts, so a crash in between leaves the case in progress instead of silently claimed.
    /// Cases whose marker or local folder can't be created are skipped.
    #[instrument(skip(self), level = "info")]
    pub fn reserve_next(&self, n: usize, lock: bool) -> Result<Vec<Case>, ManagerError> {
        if n == 0 {
            return Err(ManagerError::InvalidCount);
        }

        let mut selected = Vec::with_capacity(n);

        for mut case in self
            .repository
            .scan()?
            .into_iter()
            .filter(|case| case.status == CaseStatus::NotStarted)
        {
            if selected.len() == n {
                break;
            }

            if lock {
                let owner = self.record_owner.then(LockOwner::current);

                if let Err(error) = case.reserve(owner.as_ref()) {
                    error!(case = %case.name, error = ?error, "Failed to reserve case: {error}");
                    continue;
                }
            }

            match self.repository.download(&mut case) {
                Ok(_) => {
                    info!(
                        "Selected available case {} ({}/{n})",
                        case.name,
                        selected.len() + 1
                    );
                    selected.push(case);
                }
                Err(error) => {
                    error!(case = %case.name, error = ?error, "Failed to stage case: {error}");

                    if lock {
                        case.release();
                    }
                }
            }
        }

        if selected.len() < n {
            info!("Only {} of {n} requested cases were available", selected.len());
        }

        Ok(selected)
    }

    /// Release every case that currently carries a reservation marker
    #[instrument(skip(self), level = "info")]
    pub fn release_all(&self) -> Result<usize, ManagerError> {
        let mut released = 0;

        for mut case in self.repository.scan()?.into_iter().filter(|case| case.reserved) {
            case.release();
            released += 1;
        }

        info!("Released {released} cases");

        Ok(released)
    }

    /// Remove the reservation marker of every case, no matter who wrote it
    ///
    /// Administrative override for stale locks, the caller must have asked the operator first.
    #[instrument(skip(self), level = "info")]
    pub fn force_release_all(&self) -> Result<usize, ManagerError> {
        let mut released = 0;

        for mut case in self.repository.scan()? {
            if case.reserved {
                warn!(case = %case, "Force releasing case");
                released += 1;
            }

            // markers that became visible after the scan are removed as well
            case.release();
        }

        info!("Force released {released} reserved cases");

        Ok(released)
    }

    /// Push the results of a finished case and drop its reservation
    ///
    /// The local copy must contain the results marker. If the marker itself fails to upload the
    /// reservation is kept and an error is returned, the caller decides whether to release.
    #[instrument(skip(self, case), fields(case = %case.name), level = "info")]
    pub fn publish_result(&self, case: &mut Case) -> Result<TransferReport, ManagerError> {
        let local_location = case
            .local_location
            .as_ref()
            .ok_or_else(|| RepositoryError::NotStaged(case.name.clone()))?;

        if !local_location.join(self.repository.results_file()).is_file() {
            return Err(ManagerError::MissingResults(case.name.clone()));
        }

        let report = self.repository.upload(case)?;
        let results_file = OsStr::new(self.repository.results_file());

        if report.failed.iter().any(|(file, _)| file == results_file) {
            return Err(ManagerError::ResultsNotPublished(case.name.clone()));
        }

        case.release();
        case.status = CaseStatus::Done;
        info!(case = %case.name, "Published results");

        Ok(report)
    }

    /// Failure path for the job executor, makes the case available for other workers again
    pub fn abandon(&self, case: &mut Case) {
        warn!(case = %case.name, "Abandoning case");
        case.release();
    }

    /// Look up a case by name together with its local copy, if one was staged before
    pub fn staged(&self, name: &str) -> Result<Case, ManagerError> {
        let mut case = self
            .repository
            .case(name)
            .ok_or_else(|| ManagerError::UnknownCase(name.to_string()))?;
        let local_location = self.repository.local_path(name);

        if local_location.is_dir() {
            case.set_local_location(local_location);
        }

        Ok(case)
    }

    /// Read-only view over every case for reporting, sorted by name
    pub fn report(&self) -> Result<Vec<CaseRecord>, ManagerError> {
        Ok(self
            .repository
            .scan()?
            .iter()
            .map(|case| self.repository.record(case))
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect_vec())
    }
}
