use super::{transfer::copy_folder, transfer::TransferPlan, CaseRepository};
use crate::{
    case::CaseStatus,
    config::{
        ConfigErrors, DatabaseConfig, RunnerConfig, WorkspaceConfig, DEFAULT_LOCK_FILE,
        DEFAULT_RESULTS_FILE,
    },
    fixtures::{Fixture, RESULTS},
};
use std::{collections::BTreeMap, ffi::OsString, fs, path::PathBuf};
use tempfile::TempDir;

fn statuses(repository: &CaseRepository) -> BTreeMap<String, (CaseStatus, bool)> {
    repository
        .scan()
        .unwrap()
        .into_iter()
        .map(|case| (case.name, (case.status, case.reserved)))
        .collect()
}

fn sorted_files(path: &PathBuf) -> Vec<OsString> {
    let mut files: Vec<_> = fs::read_dir(path)
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    files.sort();
    files
}

#[test]
pub fn open_missing_database_fails() {
    let workspace = TempDir::new().unwrap();
    let result = CaseRepository::open(
        &DatabaseConfig::new(PathBuf::from("/does/not/exist/db")),
        &WorkspaceConfig {
            path: workspace.path().to_path_buf(),
        },
    );

    assert!(matches!(result, Err(ConfigErrors::DatabaseNotFound(_))));
}

#[test]
pub fn scan_empty_database() {
    let fixture = Fixture::new();

    assert!(fixture.repository().scan().unwrap().is_empty());
}

#[test]
pub fn scan_derives_status_from_markers() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[]);
    fixture.add_case("CaseB", &[DEFAULT_LOCK_FILE]);
    fixture.add_case("CaseC", &[DEFAULT_RESULTS_FILE]);
    fixture.add_case("CaseD", &[DEFAULT_LOCK_FILE, DEFAULT_RESULTS_FILE]);

    let statuses = statuses(&fixture.repository());

    assert_eq!(statuses.len(), 4);
    assert_eq!(statuses["CaseA"], (CaseStatus::NotStarted, false));
    assert_eq!(statuses["CaseB"], (CaseStatus::InProgress, true));
    assert_eq!(statuses["CaseC"], (CaseStatus::Done, false));
    assert_eq!(statuses["CaseD"], (CaseStatus::Done, true));
}

#[test]
pub fn scan_ignores_plain_files_in_root() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[]);
    fs::write(fixture.database.path().join("notes.txt"), "hello").unwrap();

    let cases = fixture.repository().scan().unwrap();

    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].name, "CaseA");
    assert_eq!(cases[0].remote_location, fixture.case_dir("CaseA"));
    assert!(cases[0].local_location.is_none());
}

#[test]
pub fn scan_is_repeatable() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[]);
    fixture.add_case("CaseB", &[DEFAULT_LOCK_FILE]);
    fixture.add_case("CaseC", &[DEFAULT_RESULTS_FILE]);
    let repository = fixture.repository();

    assert_eq!(statuses(&repository), statuses(&repository));
}

#[test]
pub fn scan_respects_custom_marker_names() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &["claim"]);
    fixture.add_case("CaseB", &[DEFAULT_LOCK_FILE]);

    let mut config = fixture.config();
    config.database.lock_file = String::from("claim");
    let repository = CaseRepository::open(&config.database, &config.workspace).unwrap();
    let statuses = statuses(&repository);

    assert_eq!(statuses["CaseA"].0, CaseStatus::InProgress);
    assert_eq!(statuses["CaseB"].0, CaseStatus::NotStarted);
}

#[test]
pub fn download_copies_every_file() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[]);
    let repository = fixture.repository();
    let mut case = repository.case("CaseA").unwrap();

    let report = repository.download(&mut case).unwrap();
    let local = fixture.workspace.path().join("CaseA");

    assert!(report.is_complete());
    assert_eq!(case.local_location, Some(local.clone()));
    assert_eq!(sorted_files(&local), sorted_files(&fixture.case_dir("CaseA")));
}

#[test]
pub fn download_twice_is_idempotent() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[]);
    let repository = fixture.repository();
    let mut case = repository.case("CaseA").unwrap();

    repository.download(&mut case).unwrap();
    let local = case.local_location.clone().unwrap();
    let first = sorted_files(&local);
    repository.download(&mut case).unwrap();

    assert_eq!(sorted_files(&local), first);
    assert_eq!(
        fs::read(local.join("CaseA.igs")).unwrap(),
        b"IGES geometry".to_vec()
    );
}

#[test]
pub fn download_skips_nested_folders() {
    let fixture = Fixture::new();
    let path = fixture.add_case("CaseA", &[]);
    fs::create_dir(path.join("mesh")).unwrap();
    let repository = fixture.repository();
    let mut case = repository.case("CaseA").unwrap();

    let report = repository.download(&mut case).unwrap();

    assert_eq!(report.skipped, vec![OsString::from("mesh")]);
    assert_eq!(report.copied.len(), 2);
}

#[test]
pub fn upload_requires_local_copy() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[]);
    let repository = fixture.repository();
    let case = repository.case("CaseA").unwrap();

    assert!(repository.upload(&case).is_err());
}

#[test]
pub fn upload_skips_lock_and_copies_results_last() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[DEFAULT_LOCK_FILE]);
    let repository = fixture.repository();
    let mut case = repository.case("CaseA").unwrap();
    repository.download(&mut case).unwrap();

    let local = case.local_location.clone().unwrap();
    fs::write(local.join(DEFAULT_RESULTS_FILE), RESULTS).unwrap();
    fs::write(local.join("CaseA.dat"), "solver data").unwrap();
    // lock vanished remotely, it must not come back with the upload
    fs::remove_file(case.lock_path()).unwrap();

    let report = repository.upload(&case).unwrap();

    assert_eq!(report.copied.last(), Some(&OsString::from(DEFAULT_RESULTS_FILE)));
    assert_eq!(report.skipped, vec![OsString::from(DEFAULT_LOCK_FILE)]);
    assert!(!fixture.has_lock("CaseA"));
    assert!(fixture.case_dir("CaseA").join("CaseA.dat").exists());
}

#[test]
pub fn copy_folder_reports_missing_source() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();

    let result = copy_folder(
        &source.path().join("gone"),
        &destination.path().join("case"),
        TransferPlan::default(),
    );

    assert!(result.is_err());
}

#[test]
pub fn copy_folder_records_unreadable_files() {
    let source = TempDir::new().unwrap();
    let destination = TempDir::new().unwrap();
    fs::write(source.path().join("good.txt"), "ok").unwrap();
    // dangling symlink behaves like a file deleted mid copy
    std::os::unix::fs::symlink(source.path().join("missing"), source.path().join("bad.txt"))
        .unwrap();

    let report = copy_folder(source.path(), destination.path(), TransferPlan::default()).unwrap();

    assert_eq!(report.copied, vec![OsString::from("good.txt")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, OsString::from("bad.txt"));
    assert!(!report.is_complete());
}

#[test]
pub fn record_reads_parameters_and_results() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[]);
    fixture.add_case("CaseC", &[DEFAULT_RESULTS_FILE]);
    let repository = fixture.repository();

    let open = repository.record(&repository.case("CaseA").unwrap());
    let done = repository.record(&repository.case("CaseC").unwrap());

    assert_eq!(open.parameters.as_ref().unwrap()["mach"], 5.0);
    assert!(open.results.is_none());
    assert_eq!(done.status, CaseStatus::Done);
    assert_eq!(done.results.as_ref().unwrap()["lift"], 1250.5);
    assert_eq!(done.results.as_ref().unwrap()["drag"], 310.25);
}

#[test]
pub fn record_tolerates_broken_json() {
    let fixture = Fixture::new();
    let path = fixture.add_case("CaseA", &[]);
    fs::write(path.join("CaseA.json"), "{ broken").unwrap();
    let repository = fixture.repository();

    let record = repository.record(&repository.case("CaseA").unwrap());

    assert!(record.parameters.is_none());
    assert!(!fixture.has_lock("CaseA"));
}

#[test]
pub fn seed_creates_case_per_design() {
    let fixture = Fixture::new();
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("design_1.igs"), "geometry").unwrap();
    fs::write(project.path().join("design_1.json"), r#"{"mach": 6.0}"#).unwrap();
    fs::write(project.path().join("design_2.igs"), "geometry").unwrap();
    fs::write(project.path().join("readme.md"), "ignored").unwrap();

    let config = fixture.config();
    let repository = fixture.repository();
    let seeded = repository
        .seed(project.path(), &config.seed_matcher().unwrap())
        .unwrap();

    assert_eq!(
        seeded.into_iter().collect::<Vec<_>>(),
        vec![String::from("design_1"), String::from("design_2")]
    );
    assert_eq!(
        sorted_files(&fixture.case_dir("design_1")),
        vec![OsString::from("design_1.igs"), OsString::from("design_1.json")]
    );

    let statuses = statuses(&repository);
    assert_eq!(statuses["design_1"].0, CaseStatus::NotStarted);
    assert_eq!(statuses["design_2"].0, CaseStatus::NotStarted);
}

#[test]
pub fn seed_missing_project_fails() {
    let fixture = Fixture::new();
    let config = RunnerConfig::new(
        fixture.database.path().to_path_buf(),
        fixture.workspace.path().to_path_buf(),
    );

    assert!(fixture
        .repository()
        .seed(&PathBuf::from("/does/not/exist"), &config.seed_matcher().unwrap())
        .is_err());
}

#[test]
pub fn download_replaces_previous_local_copy() {
    let fixture = Fixture::new();
    fixture.add_case("CaseA", &[]);
    let repository = fixture.repository();
    let mut case = repository.case("CaseA").unwrap();

    repository.download(&mut case).unwrap();
    let local = case.local_location.clone().unwrap();
    fs::write(local.join(DEFAULT_RESULTS_FILE), RESULTS).unwrap();
    fs::write(local.join("CaseA.dat"), "old solver data").unwrap();
    repository.download(&mut case).unwrap();

    assert_eq!(sorted_files(&local), sorted_files(&fixture.case_dir("CaseA")));
    assert!(!local.join(DEFAULT_RESULTS_FILE).exists());
}
