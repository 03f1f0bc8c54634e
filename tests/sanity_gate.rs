//! End-to-end tests of the sanity stage through the compiled binary.
//!
//! These stay clear of the pipeline proper, which needs skopeo and network
//! access; a structural sanity failure aborts the run before either is
//! touched, so everything here is hermetic.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

const EXIT_USAGE: i32 = 2;
const EXIT_SANITY: i32 = 9;

fn run_gate(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sync-gate"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to run sync-gate: {err}"))
}

/// Lay out `<root>/quay.io/podman/stable:latest` holding `manifest`.
fn write_artifact(root: &TempDir, manifest: &str) -> PathBuf {
    let dir = root.path().join("quay.io/podman/stable:latest");
    fs::create_dir_all(&dir).unwrap_or_else(|err| panic!("create dirs: {err}"));
    fs::write(dir.join("manifest.json"), manifest)
        .unwrap_or_else(|err| panic!("write manifest: {err}"));
    dir
}

#[test]
fn nonexistent_directory_exits_sanity_status() {
    let output = run_gate(&["no/such/dir:tag"]);
    assert_eq!(output.status.code(), Some(EXIT_SANITY));
    let report = String::from_utf8_lossy(&output.stdout);
    assert!(report.contains("Validation results for 'no/such/dir:tag':"));
    assert!(report.contains("Sanity: FAIL  # Path does not exist"));
}

#[test]
fn one_bad_input_aborts_before_checking_good_ones() {
    let root = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let good = write_artifact(&root, r#"{"schemaVersion": 2}"#);
    let good = good.to_str().unwrap_or_else(|| panic!("utf-8 tempdir"));
    let output = run_gate(&[good, "no/such/dir:tag"]);
    assert_eq!(output.status.code(), Some(EXIT_SANITY));
    let report = String::from_utf8_lossy(&output.stdout);
    // Both records are reported, but no pipeline check ever ran.
    assert!(report.contains("Sanity: PASS"));
    assert!(report.contains("Sanity: FAIL  # Path does not exist"));
    assert!(!report.contains("Skopeo Inspect"));
}

#[test]
fn wrong_registry_is_a_sanity_failure() {
    let root = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let dir = write_artifact(&root, r#"{"schemaVersion": 2}"#);
    let dir = dir.to_str().unwrap_or_else(|| panic!("utf-8 tempdir"));
    let output = run_gate(&["--registry", "docker.io", dir]);
    assert_eq!(output.status.code(), Some(EXIT_SANITY));
    let report = String::from_utf8_lossy(&output.stdout);
    assert!(report.contains("Sanity: FAIL  # Missing 'docker.io' registry server"));
}

#[test]
fn matching_with_one_input_is_a_usage_error() {
    let output = run_gate(&["--matching", "a/b/c:tag"]);
    assert_eq!(output.status.code(), Some(EXIT_USAGE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Matching (-m,--matching) option specified with only one <fqin_dir>"));
}

#[test]
fn commit_without_cirrus_is_a_usage_error() {
    let output = run_gate(&["--commit", "0123456789012345678901234567890123456789", "a/b/c:tag"]);
    assert_eq!(output.status.code(), Some(EXIT_USAGE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--cirrus"));
}

#[test]
fn no_inputs_is_rejected_by_the_parser() {
    let output = run_gate(&[]);
    assert_eq!(output.status.code(), Some(EXIT_USAGE));
}
