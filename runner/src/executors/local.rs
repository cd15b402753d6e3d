use super::{ExecutorError, RunSummary};
use crate::{
    config::ExecutorConfig,
    manager::{reservation::Reservation, CaseManager},
};
use parking_lot::Mutex;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

/// file inside the staged case receiving the output of the job command
pub const JOB_LOG: &str = "casesync.log";

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Case was never staged")]
    NotStaged,
    #[error("Failed to prepare job log: {0}")]
    Log(io::Error),
    #[error("Failed to spawn job: {0}")]
    Spawn(io::Error),
    #[error("Failed to wait for job: {0}")]
    Wait(io::Error),
    #[error("Job ran into timeout")]
    Timeout,
    #[error("Job exited with {0}")]
    Status(ExitStatus),
}

/// Executor that runs the job command for every reserved case on a local thread pool
#[derive(Clone, Debug)]
pub struct LocalExecutor {
    command: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    threads: Option<usize>,
}

impl LocalExecutor {
    pub fn load(config: &ExecutorConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout),
            threads: config.threads,
        }
    }

    /// Reserve up to `n` cases and process them concurrently
    ///
    /// A case is published when the job exits successfully, every other outcome releases it.
    #[instrument(skip(self, manager), level = "info")]
    pub fn execute(&self, manager: &CaseManager, n: usize) -> Result<RunSummary, ExecutorError> {
        // wrap right away, from here on every case is released unless it gets published
        let reservations: Vec<Reservation> = manager
            .reserve_next(n, true)?
            .into_iter()
            .map(|case| Reservation::new(manager, case))
            .collect();

        if reservations.is_empty() {
            info!("No cases available");
            return Ok(RunSummary::default());
        }

        let thread_number = self.threads.unwrap_or(reservations.len());
        debug!("Starting thread pool with {thread_number} threads");

        let pool = ThreadPoolBuilder::new().num_threads(thread_number).build()?;

        let total = reservations.len() as u64;
        let processed = AtomicU64::new(0);
        let summary = Mutex::new(RunSummary::default());

        pool.install(|| {
            reservations.into_par_iter().for_each(|reservation| {
                let name = reservation.name.clone();

                match self.run_job(&reservation) {
                    Ok(elapsed) => {
                        debug!(case = %name, "Job finished in {} s", elapsed.as_secs());

                        match reservation.publish() {
                            Ok(_) => summary.lock().published.push(name),
                            Err(error) => {
                                error!(case = %name, error = ?error, "Failed to publish results: {error}");
                                summary.lock().released.push(name);
                            }
                        }
                    }
                    Err(error) => {
                        warn!(case = %name, error = ?error, "Job failed: {error}");
                        drop(reservation);
                        summary.lock().released.push(name);
                    }
                }

                info!(
                    "Done with {}/{}",
                    processed.fetch_add(1, Ordering::SeqCst) + 1,
                    total
                );
            })
        });

        info!("Done with processing");

        Ok(summary.into_inner())
    }

    fn run_job(&self, reservation: &Reservation) -> Result<Duration, JobError> {
        let local_location = reservation
            .local_location
            .as_deref()
            .ok_or(JobError::NotStaged)?;
        let (stdout, stderr) = job_log(local_location).map_err(JobError::Log)?;
        let start = Instant::now();

        let mut child = Command::new(&self.command)
            .args(self.args.iter())
            .arg(local_location)
            .current_dir(local_location)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(JobError::Spawn)?;

        match child.wait_timeout(self.timeout).map_err(JobError::Wait)? {
            Some(status) if status.success() => Ok(start.elapsed()),
            Some(status) => Err(JobError::Status(status)),
            None => {
                // child hasn't exited yet
                if let Err(error) = child.kill() {
                    warn!(error = ?error, "Failed to kill job after timeout");
                }
                child.wait().map_err(JobError::Wait)?;

                Err(JobError::Timeout)
            }
        }
    }
}

fn job_log(local_location: &Path) -> io::Result<(File, File)> {
    let stdout = File::create(local_location.join(JOB_LOG))?;
    let stderr = stdout.try_clone()?;

    Ok((stdout, stderr))
}
