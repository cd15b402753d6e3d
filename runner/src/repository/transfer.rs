use std::{
    ffi::{OsStr, OsString},
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Outcome of copying one case folder
///
/// Only the folder listing itself can fail a transfer, every single file is best effort.
#[derive(Debug)]
pub struct TransferReport {
    pub destination: PathBuf,
    pub copied: Vec<OsString>,
    pub failed: Vec<(OsString, io::Error)>,
    pub skipped: Vec<OsString>,
}

impl TransferReport {
    fn new(destination: PathBuf) -> Self {
        Self {
            destination,
            copied: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Files of a folder that should be handled specially while copying
#[derive(Debug, Default, Clone, Copy)]
pub struct TransferPlan<'a> {
    /// never copied
    pub exclude: Option<&'a OsStr>,
    /// copied after every other file
    pub last: Option<&'a OsStr>,
}

/// Copy every regular file directly inside `source` into `destination`
///
/// The destination is created if missing. Files may disappear while copying since other workers
/// and the sync client mutate the database concurrently, such files are recorded as failed.
pub fn copy_folder(
    source: &Path,
    destination: &Path,
    plan: TransferPlan<'_>,
) -> io::Result<TransferReport> {
    fs::create_dir_all(destination)?;

    let mut report = TransferReport::new(destination.to_path_buf());
    let mut deferred = None;

    for entry in fs::read_dir(source)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(source = ?source, error = ?error, "Failed to read folder entry, skipping");
                continue;
            }
        };
        let file_name = entry.file_name();

        if plan.exclude == Some(file_name.as_os_str()) {
            report.skipped.push(file_name);
            continue;
        }

        if entry.path().is_dir() {
            debug!(path = ?entry.path(), "Skipping nested folder");
            report.skipped.push(file_name);
            continue;
        }

        if plan.last == Some(file_name.as_os_str()) {
            deferred = Some(file_name);
            continue;
        }

        copy_file(source, destination, file_name, &mut report);
    }

    if let Some(file_name) = deferred {
        copy_file(source, destination, file_name, &mut report);
    }

    Ok(report)
}

fn copy_file(source: &Path, destination: &Path, file_name: OsString, report: &mut TransferReport) {
    let from = source.join(&file_name);
    let to = destination.join(&file_name);

    match fs::copy(&from, &to) {
        Ok(_) => {
            debug!(file = ?file_name, destination = ?destination, "File copied successfully");
            report.copied.push(file_name);
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            warn!(file = ?file_name, "Source file vanished before it could be copied");
            report.failed.push((file_name, error));
        }
        Err(error) => {
            warn!(file = ?file_name, error = ?error, "Failed to copy file: {error}");
            report.failed.push((file_name, error));
        }
    }
}
