use crate::{
    config::{RunnerConfig, DEFAULT_LOCK_FILE, DEFAULT_RESULTS_FILE},
    manager::CaseManager,
    repository::CaseRepository,
};
use std::{fs, path::PathBuf};
use tempfile::TempDir;

pub const PARAMETERS: &str = r#"{"mach": 5.0, "angle_of_attack": 2.5}"#;
pub const RESULTS: &str = r#"{"lift": 1250.5, "drag": 310.25}"#;

/// shared database and local workspace living in temporary folders
pub struct Fixture {
    pub database: TempDir,
    pub workspace: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            database: TempDir::new().unwrap(),
            workspace: TempDir::new().unwrap(),
        }
    }

    pub fn config(&self) -> RunnerConfig {
        RunnerConfig::new(
            self.database.path().to_path_buf(),
            self.workspace.path().to_path_buf(),
        )
    }

    pub fn repository(&self) -> CaseRepository {
        let config = self.config();

        CaseRepository::open(&config.database, &config.workspace).unwrap()
    }

    pub fn manager(&self) -> CaseManager {
        CaseManager::load(&self.config()).unwrap()
    }

    pub fn case_dir(&self, name: &str) -> PathBuf {
        self.database.path().join(name)
    }

    /// create a case folder with a geometry file, a parameter record and the given markers
    pub fn add_case(&self, name: &str, markers: &[&str]) -> PathBuf {
        let path = self.case_dir(name);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(format!("{name}.igs")), b"IGES geometry").unwrap();
        fs::write(path.join(format!("{name}.json")), PARAMETERS).unwrap();

        for marker in markers {
            let contents = if *marker == DEFAULT_RESULTS_FILE {
                RESULTS
            } else {
                ""
            };
            fs::write(path.join(marker), contents).unwrap();
        }

        path
    }

    pub fn has_lock(&self, name: &str) -> bool {
        self.case_dir(name).join(DEFAULT_LOCK_FILE).exists()
    }

    pub fn has_results(&self, name: &str) -> bool {
        self.case_dir(name).join(DEFAULT_RESULTS_FILE).exists()
    }
}
