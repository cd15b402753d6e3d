pub mod local;


use crate::{
    config::{ConfigErrors, RunnerConfig},
    manager::{CaseManager, ManagerError},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to build thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// What happened to the cases of one run
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub published: Vec<String>,
    pub released: Vec<String>,
}

#[derive(Clone, Debug)]
pub enum Executors {
    Local(local::LocalExecutor),
}

impl Executors {
    pub fn load(config: &RunnerConfig) -> Result<Self, ConfigErrors> {
        match config.executor {
            Some(ref executor) => Ok(Self::Local(local::LocalExecutor::load(executor))),
            None => Err(ConfigErrors::MissingExecutor),
        }
    }

    /// reserve up to `n` cases and run each of them through the job command
    pub fn execute(&self, manager: &CaseManager, n: usize) -> Result<RunSummary, ExecutorError> {
        match self {
            Self::Local(executor) => executor.execute(manager, n),
        }
    }
}
