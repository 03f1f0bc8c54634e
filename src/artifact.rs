//! Artifact records and the FQIN sanity verifier.
//!
//! One [`ArtifactRecord`] exists per input directory for the life of the
//! run. The sanity verifier fills in the derived fields and the `Sanity`
//! result slot; everything after that only appends check results.
//!
//! The `--scoped` option to `skopeo sync` is what makes this work at all:
//! the final three path segments are the only reliable way to assert the
//! actual FQIN synced down from the remote repository, since internal
//! annotations can be manipulated (checked later).

use crate::checks::CheckResult;
use crate::digest::digest_bytes;
use crate::error::{GateError, Result};
use crate::metadata::get_ci;
use crate::options::ValidationOptions;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use serde_json::Value;

/// Slot name of the pre-check sanity stage.
pub const SANITY: &str = "Sanity";

/// Comment rendered for the not-applicable placeholder result.
pub const NOT_APPLICABLE: &str = "N/A";

/// Manifest descriptor file every synced directory must contain.
const MANIFEST_FILE: &str = "manifest.json";

/// Everything known about one input directory, plus its check results.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    /// Directory the artifact was loaded from.
    pub path: Utf8PathBuf,
    /// Fully-qualified image name; absent when sanity failed before naming.
    pub fqin: Option<String>,
    /// Parsed top-level manifest; absent when sanity failed before parsing.
    pub manifest: Option<Value>,
    /// Digest of the raw on-disk manifest bytes.
    pub manifest_digest: Option<String>,
    /// Whether the manifest is a multi-platform manifest-list.
    pub is_manifest_list: bool,
    results: Vec<(&'static str, CheckResult)>,
}

/// Borrowed view of a record that passed classification.
#[derive(Debug, Clone, Copy)]
pub struct Classified<'a> {
    /// Fully-qualified image name.
    pub fqin: &'a str,
    /// Directory the artifact was loaded from.
    pub path: &'a Utf8Path,
    /// Parsed top-level manifest.
    pub manifest: &'a Value,
    /// Digest of the raw manifest bytes.
    pub manifest_digest: &'a str,
    /// Whether this is a manifest-list.
    pub is_manifest_list: bool,
}

impl ArtifactRecord {
    /// A bare record for `path` with no results stored.
    #[must_use]
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            fqin: None,
            manifest: None,
            manifest_digest: None,
            is_manifest_list: false,
            results: Vec::new(),
        }
    }

    /// FQIN when known, otherwise the input path.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.fqin.as_deref().unwrap_or(self.path.as_str())
    }

    /// The classified view, available once sanity verification succeeded.
    #[must_use]
    pub fn classified(&self) -> Option<Classified<'_>> {
        Some(Classified {
            fqin: self.fqin.as_deref()?,
            path: &self.path,
            manifest: self.manifest.as_ref()?,
            manifest_digest: self.manifest_digest.as_deref()?,
            is_manifest_list: self.is_manifest_list,
        })
    }

    /// The stored result for `name`, if any.
    #[must_use]
    pub fn result(&self, name: &str) -> Option<&CheckResult> {
        self.results
            .iter()
            .find(|(slot, _)| *slot == name)
            .map(|(_, result)| result)
    }

    /// Stored results in insertion order.
    pub fn results(&self) -> impl Iterator<Item = (&'static str, &CheckResult)> {
        self.results.iter().map(|(name, result)| (*name, result))
    }

    /// Whether the sanity stage passed for this record.
    #[must_use]
    pub fn sanity_passed(&self) -> bool {
        matches!(self.result(SANITY), Some(CheckResult::Pass(_)))
    }

    /// Store a definite result; each (artifact, check) slot is write-once.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::ResultOverwrite`] when the slot already holds a
    /// result.
    pub fn set_result(&mut self, name: &'static str, result: CheckResult) -> Result<()> {
        if self.result(name).is_some() {
            return Err(GateError::ResultOverwrite {
                artifact: self.identifier().to_owned(),
                check: name.to_owned(),
            });
        }
        debug!(
            "storing '{name}' result {result:?} for '{}'",
            self.identifier()
        );
        self.results.push((name, result));
        Ok(())
    }

    /// Store the not-applicable placeholder, unless the slot is occupied.
    ///
    /// Placeholder attempts against an occupied slot are never an error; a
    /// sibling check may already have written a definite result there.
    pub fn set_placeholder(&mut self, name: &'static str) {
        if self.result(name).is_some() {
            debug!("ignoring placeholder for occupied '{name}' slot");
            return;
        }
        self.results
            .push((name, CheckResult::pass_with(NOT_APPLICABLE)));
    }
}

/// Verify one input directory and produce its record.
///
/// Runs the ordered structural checks, derives the FQIN, enforces the
/// registry constraint, rejects duplicates of `existing` records, loads and
/// digests the manifest, and classifies the artifact. Every failure path
/// stores a `Sanity` failure in the returned (possibly partial) record;
/// nothing here panics on malformed input.
#[must_use]
pub fn verify_artifact(
    path: &Utf8Path,
    existing: &[ArtifactRecord],
    options: &ValidationOptions,
) -> ArtifactRecord {
    let mut record = ArtifactRecord::new(path.to_owned());
    let verdict = classify(&mut record, existing, options);
    if let Err(err) = record.set_result(SANITY, verdict) {
        // A fresh record has no occupied slots; only a logic error gets here.
        warn!("discarding duplicate sanity verdict: {err}");
    }
    record
}

/// Run the sanity stage proper, filling `record` fields as they are derived.
fn classify(
    record: &mut ArtifactRecord,
    existing: &[ArtifactRecord],
    options: &ValidationOptions,
) -> CheckResult {
    let path = record.path.clone();
    let manifest_path = path.join(MANIFEST_FILE);

    if let Err(reason) = structural_checks(&path, &manifest_path) {
        debug!("basic sanity failure for '{path}': {reason}");
        return CheckResult::fail(reason);
    }

    // Path length asserted >= 3 by the structural checks.
    let segments: Vec<&str> = path.as_str().split('/').filter(|s| !s.is_empty()).collect();
    let fqin = segments[segments.len() - 3..].join("/");
    debug!("extracted FQIN '{fqin}' from '{path}'");
    record.fqin = Some(fqin.clone());

    // A registry mismatch blocks all other checks, so it lives here rather
    // than in the pipeline.
    let mut pass_comment = None;
    match &options.expected_registry {
        Some(registry) if !fqin.starts_with(registry.as_str()) => {
            return CheckResult::fail(format!("Missing '{registry}' registry server"));
        }
        Some(_) => {}
        None => pass_comment = Some("Registry check skipped.".to_owned()),
    }

    for other in existing {
        if other.fqin.as_deref() == Some(fqin.as_str()) || other.path == path {
            return CheckResult::fail("FQIN dir specified twice or symlinked");
        }
    }

    let raw = match std::fs::read(&manifest_path) {
        Ok(raw) => raw,
        Err(err) => return CheckResult::fail(format!("Failed to read {MANIFEST_FILE}: {err}")),
    };
    // Digest the exact on-disk bytes; this is the registry-verifiable digest.
    record.manifest_digest = Some(digest_bytes(&raw));

    let manifest: Value = match serde_json::from_slice(&raw) {
        Ok(manifest) => manifest,
        Err(_) => return CheckResult::fail("Failed to parse manifest as JSON"),
    };

    match get_ci(&manifest, "manifests") {
        Some(Value::Array(_)) => {
            debug!("'{path}' appears to represent a manifest-list");
            record.is_manifest_list = true;
        }
        Some(other) => {
            return CheckResult::fail(format!(
                "Present manifest 'manifests' item is a non-list: {other}"
            ));
        }
        None => {
            debug!("'{path}' appears to represent a regular/simple image");
            record.is_manifest_list = false;
        }
    }
    record.manifest = Some(manifest);

    CheckResult::Pass(pass_comment)
}

/// Ordered structural checks; the first failure names the violated condition.
fn structural_checks(path: &Utf8Path, manifest_path: &Utf8Path) -> std::result::Result<(), String> {
    let conditions: [(&str, bool); 6] = [
        ("Path does not exist", path.exists()),
        ("Path is not a dir", path.is_dir()),
        (
            "Path has < 3 name components",
            path.as_str().split('/').filter(|s| !s.is_empty()).count() >= 3,
        ),
        (
            "Final path name missing ':'",
            final_segment_has_tag(path),
        ),
        ("No manifest.json inside path", manifest_path.exists()),
        ("manifest.json not a file", manifest_path.is_file()),
    ];
    for (reason, ok) in conditions {
        if !ok {
            return Err(reason.to_owned());
        }
    }
    Ok(())
}

/// Whether the final path segment carries an interior tag separator.
fn final_segment_has_tag(path: &Utf8Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    // The ':' must be neither the first nor the last character.
    name.rfind(':')
        .is_some_and(|at| at >= 1 && at < name.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn options() -> ValidationOptions {
        ValidationOptions {
            expected_registry: Some("example.com".to_owned()),
            expected_platforms: None,
            expected_labels: BTreeSet::new(),
            matching_digests: false,
            provenance: None,
        }
    }

    /// Lay out `<root>/example.com/podman/stable:latest` with a manifest.
    fn write_artifact(root: &TempDir, manifest: &str) -> Utf8PathBuf {
        let dir = Utf8PathBuf::from_path_buf(root.path().to_path_buf())
            .expect("utf-8 tempdir")
            .join("example.com/podman/stable:latest");
        fs::create_dir_all(&dir).expect("create dirs");
        fs::write(dir.join(MANIFEST_FILE), manifest).expect("write manifest");
        dir
    }

    fn sanity_reason(record: &ArtifactRecord) -> String {
        match record.result(SANITY) {
            Some(CheckResult::Fail(reason)) => reason.clone(),
            other => panic!("expected sanity failure, got {other:?}"),
        }
    }

    #[test]
    fn nonexistent_path_fails_naming_condition() {
        let record = verify_artifact(Utf8Path::new("no/such/dir:tag"), &[], &options());
        assert_eq!(sanity_reason(&record), "Path does not exist");
    }

    #[test]
    fn verify_stores_exactly_one_sanity_result() {
        let record = verify_artifact(Utf8Path::new("no/such/dir:tag"), &[], &options());
        let sanity_slots = record.results().filter(|(name, _)| *name == SANITY).count();
        assert_eq!(sanity_slots, 1);
    }

    #[test]
    fn missing_manifest_fails_naming_file() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_artifact(&root, "{}");
        fs::remove_file(dir.join(MANIFEST_FILE)).expect("remove");
        let record = verify_artifact(&dir, &[], &options());
        assert_eq!(sanity_reason(&record), "No manifest.json inside path");
    }

    #[test]
    fn missing_tag_separator_fails() {
        let root = TempDir::new().expect("tempdir");
        let dir = Utf8PathBuf::from_path_buf(root.path().to_path_buf())
            .expect("utf-8 tempdir")
            .join("example.com/podman/stable");
        fs::create_dir_all(&dir).expect("create dirs");
        fs::write(dir.join(MANIFEST_FILE), "{}").expect("write");
        let record = verify_artifact(&dir, &[], &options());
        assert_eq!(sanity_reason(&record), "Final path name missing ':'");
    }

    #[test]
    fn registry_mismatch_fails_fast() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_artifact(&root, "{}");
        let mut opts = options();
        opts.expected_registry = Some("quay.io".to_owned());
        let record = verify_artifact(&dir, &[], &opts);
        assert_eq!(sanity_reason(&record), "Missing 'quay.io' registry server");
    }

    #[test]
    fn disabled_registry_annotates_pass() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_artifact(&root, "{}");
        let mut opts = options();
        opts.expected_registry = None;
        let record = verify_artifact(&dir, &[], &opts);
        assert_eq!(
            record.result(SANITY),
            Some(&CheckResult::pass_with("Registry check skipped."))
        );
    }

    #[test]
    fn duplicate_fqin_is_rejected() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_artifact(&root, "{}");
        let first = verify_artifact(&dir, &[], &options());
        assert!(first.sanity_passed());
        let second = verify_artifact(&dir, &[first], &options());
        assert_eq!(
            sanity_reason(&second),
            "FQIN dir specified twice or symlinked"
        );
    }

    #[test]
    fn malformed_manifest_fails_not_crashes() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_artifact(&root, "{nope");
        let record = verify_artifact(&dir, &[], &options());
        assert_eq!(sanity_reason(&record), "Failed to parse manifest as JSON");
        // Digest still reflects the raw bytes that were present.
        assert!(record.manifest_digest.is_some());
    }

    #[test]
    fn manifests_array_classifies_as_list() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_artifact(&root, &json!({"manifests": []}).to_string());
        let record = verify_artifact(&dir, &[], &options());
        assert!(record.sanity_passed());
        assert!(record.is_manifest_list);
    }

    #[test]
    fn manifests_non_list_fails() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_artifact(&root, &json!({"Manifests": "oops"}).to_string());
        let record = verify_artifact(&dir, &[], &options());
        assert!(sanity_reason(&record).contains("non-list"));
    }

    #[test]
    fn absent_manifests_classifies_as_image() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_artifact(&root, &json!({"schemaVersion": 2}).to_string());
        let record = verify_artifact(&dir, &[], &options());
        assert!(record.sanity_passed());
        assert!(!record.is_manifest_list);
        assert_eq!(
            record.fqin.as_deref(),
            Some("example.com/podman/stable:latest")
        );
    }

    #[test]
    fn second_result_write_is_rejected() {
        let mut record = ArtifactRecord::new("a/b/c:1".into());
        record.set_result("Example", CheckResult::pass()).expect("first write");
        let err = record
            .set_result("Example", CheckResult::fail("later"))
            .expect_err("second write must be rejected");
        assert!(matches!(err, GateError::ResultOverwrite { .. }));
    }

    #[test]
    fn placeholder_never_overwrites() {
        let mut record = ArtifactRecord::new("a/b/c:1".into());
        record
            .set_result("Example", CheckResult::fail("real result"))
            .expect("first write");
        record.set_placeholder("Example");
        assert_eq!(
            record.result("Example"),
            Some(&CheckResult::fail("real result"))
        );
    }

    #[test]
    fn placeholder_fills_empty_slot() {
        let mut record = ArtifactRecord::new("a/b/c:1".into());
        record.set_placeholder("Example");
        assert_eq!(
            record.result("Example"),
            Some(&CheckResult::pass_with(NOT_APPLICABLE))
        );
    }
}
