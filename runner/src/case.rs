pub mod owner;


use owner::LockOwner;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display},
    fs::{self, File},
    io::{ErrorKind, Write},
    path::PathBuf,
};
use tracing::{debug, error, info, warn};

/// Derived state of a case, recomputed from marker files on every scan
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    NotStarted,
    InProgress,
    Done,
}

impl CaseStatus {
    /// map marker presence to a status, the results marker always wins
    pub fn from_markers(has_lock: bool, has_results: bool) -> Self {
        match (has_lock, has_results) {
            (_, true) => Self::Done,
            (true, false) => Self::InProgress,
            (false, false) => Self::NotStarted,
        }
    }
}

impl Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "NOT DONE",
            Self::InProgress => "IN PROGRESS",
            Self::Done => "DONE",
        })
    }
}

/// One unit of work, i.e., a folder in the shared database
#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    /// folder inside the shared database, NOT a local path
    pub remote_location: PathBuf,
    /// staged copy inside the local workspace (if applicable)
    pub local_location: Option<PathBuf>,
    pub status: CaseStatus,
    pub reserved: bool,
    /// owner recorded inside the lock marker, empty markers have none
    pub owner: Option<LockOwner>,

    lock_file: String,
}

impl Case {
    pub fn new(
        name: impl Into<String>,
        remote_location: PathBuf,
        lock_file: impl Into<String>,
        status: CaseStatus,
        reserved: bool,
    ) -> Self {
        Self {
            name: name.into(),
            remote_location,
            local_location: None,
            status,
            reserved,
            owner: None,
            lock_file: lock_file.into(),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.remote_location.join(&self.lock_file)
    }

    pub fn set_local_location(&mut self, local_location: PathBuf) {
        self.local_location = Some(local_location);
    }

    /// Write the reservation marker into the remote folder
    ///
    /// Creating an already existing marker is harmless, the file is simply rewritten. Other
    /// workers only observe the marker once the sync client propagated it, so this is an
    /// advisory lock at best.
    pub fn reserve(&mut self, owner: Option<&LockOwner>) -> std::io::Result<()> {
        let lock_path = self.lock_path();
        let mut file = File::create(&lock_path)?;

        if let Some(owner) = owner {
            let body = serde_json::to_vec(owner)?;
            file.write_all(&body)?;
            self.owner = Some(owner.clone());
        }

        debug!(case = %self.name, path = ?lock_path, "Wrote reservation marker");
        self.reserved = true;
        if self.status == CaseStatus::NotStarted {
            self.status = CaseStatus::InProgress;
        }

        Ok(())
    }

    /// Remove the reservation marker, never fails the caller
    ///
    /// A missing marker counts as success, any other error is logged and swallowed. Callers run
    /// this unconditionally on cleanup paths.
    pub fn release(&mut self) {
        let lock_path = self.lock_path();

        let removed = match fs::remove_file(&lock_path) {
            Ok(()) => {
                info!(case = %self.name, "Released case");
                true
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(case = %self.name, "Case was not locked");
                true
            }
            Err(error) if error.kind() == ErrorKind::PermissionDenied => {
                warn!(case = %self.name, error = ?error, "Permission denied while removing lock");
                false
            }
            Err(error) => {
                error!(case = %self.name, error = ?error, "Error deleting lock: {error}");
                false
            }
        };

        // a marker that could not be removed keeps the case reserved
        if removed {
            self.reserved = false;
            self.owner = None;
            if self.status == CaseStatus::InProgress {
                self.status = CaseStatus::NotStarted;
            }
        }
    }
}

impl Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.status)?;

        if self.reserved {
            f.write_str(" (LOCKED)")?;
        }

        if let Some(ref owner) = self.owner {
            write!(f, " by {owner}")?;
        }

        Ok(())
    }
}
