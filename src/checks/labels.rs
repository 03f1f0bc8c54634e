//! Label consistency and expected-label check.
//!
//! Manifest and config must agree exactly on their label maps for every
//! platform entry; the agreed map is then required to cover the configured
//! label set. The gathering half is shared with the provenance check, which
//! re-validates a minimal subset even when `--labels` is disabled.

use super::{Check, CheckResult, Collaborators, Outcome};
use crate::artifact::ArtifactRecord;
use crate::inspect::Inspector;
use crate::metadata::get_ci;
use crate::options::ValidationOptions;
use crate::walk::{Step, Walk, for_each_platform};
use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Validates label consistency and presence of the expected label set.
pub struct LabelsCheck;

impl Check for LabelsCheck {
    fn name(&self) -> &'static str {
        "Expected Labels"
    }

    fn run(
        &self,
        index: usize,
        records: &[ArtifactRecord],
        options: &ValidationOptions,
        collaborators: &Collaborators<'_>,
    ) -> Outcome {
        if options.expected_labels.is_empty() {
            return Outcome::result(CheckResult::Skipped);
        }
        let Some(record) = records.get(index) else {
            return Outcome::result(CheckResult::Indeterminate);
        };

        let labels = match gather_labels(record, collaborators.inspector) {
            Ok(labels) => labels,
            Err(result) => return Outcome::result(result),
        };
        debug!("verified consistent labels: {labels:?}");
        Outcome::result(expected_labels_present(&options.expected_labels, &labels))
    }
}

/// Gather and consistency-check labels across every platform entry.
///
/// Returns the accumulated label map, or the terminal result when a platform
/// entry's manifest and config disagree.
pub fn gather_labels(
    record: &ArtifactRecord,
    inspector: &dyn Inspector,
) -> std::result::Result<BTreeMap<String, String>, CheckResult> {
    let mut gathered = BTreeMap::new();
    let walk = for_each_platform(record, inspector, |_, manifest, config| {
        match consistent_labels(manifest, config) {
            Ok(labels) => {
                gathered.extend(labels);
                Step::Continue
            }
            Err(reason) => Step::Stop(CheckResult::fail(reason)),
        }
    });
    match walk {
        Walk::Completed => Ok(gathered),
        Walk::Halted(result) => Err(result),
    }
}

/// Require the manifest and config label maps of one entry to agree exactly.
fn consistent_labels(
    manifest: &Value,
    config: &Value,
) -> std::result::Result<BTreeMap<String, String>, String> {
    let Some(Value::Object(manifest_labels)) = get_ci(manifest, "labels") else {
        return Err("Encountered null manifest label list".to_owned());
    };
    let config_labels = get_ci(config, "config").and_then(|section| get_ci(section, "labels"));
    let Some(Value::Object(config_labels)) = config_labels else {
        return Err("Encountered null config label list".to_owned());
    };

    // Both directions: a set comparison would do, but would complicate
    // naming the offending key in the failure.
    for (label, value) in manifest_labels {
        match config_labels.get(label) {
            None => return Err(format!("Missing manifest label {label} in config")),
            Some(config_value) if config_value != value => {
                return Err(format!("Different manifest label {label} value in config"));
            }
            Some(_) => {}
        }
    }
    let mut agreed = BTreeMap::new();
    for (label, value) in config_labels {
        match manifest_labels.get(label) {
            None => return Err(format!("Missing config label {label} in manifest")),
            Some(manifest_value) if manifest_value != value => {
                return Err(format!("Different config label {label} value in manifest"));
            }
            Some(_) => {
                agreed.insert(label.clone(), label_text(value));
            }
        }
    }
    Ok(agreed)
}

/// Validate all `expected` keys are present among `actual`.
pub fn expected_labels_present(
    expected: &BTreeSet<String>,
    actual: &BTreeMap<String, String>,
) -> CheckResult {
    let actual_keys: BTreeSet<&str> = actual.keys().map(String::as_str).collect();
    let missing: Vec<&str> = expected
        .iter()
        .map(String::as_str)
        .filter(|key| !actual_keys.contains(key))
        .collect();
    if missing.is_empty() {
        return CheckResult::pass();
    }
    // BTreeSet iteration already yields the sorted order callers rely on.
    CheckResult::fail(format!("Missing labels: {missing:?}"))
}

/// Render a label value as text; labels are strings in practice.
fn label_text(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_owned)
}
