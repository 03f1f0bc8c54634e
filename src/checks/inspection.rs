//! Inspection sanity check.
//!
//! Skopeo performs little validation of its own, but every later check
//! depends on it being able to read the directory, so its basic function is
//! confirmed first: the raw manifest must be retrievable, and each platform's
//! inspected manifest and config must carry the keys the rest of the
//! pipeline relies on.

use super::{Check, CheckResult, Collaborators, Outcome};
use crate::artifact::ArtifactRecord;
use crate::metadata::get_ci;
use crate::options::ValidationOptions;
use crate::walk::{Step, Walk, for_each_platform};
use serde_json::Value;

/// Keys every inspected manifest must carry (case-insensitive).
const MANIFEST_KEYS: [&str; 7] = [
    "digest",
    "created",
    "labels",
    "architecture",
    "os",
    "layers",
    "layersdata",
];

/// Keys every image config must carry (case-insensitive).
const CONFIG_KEYS: [&str; 6] = [
    "created",
    "architecture",
    "os",
    "config",
    "rootfs",
    "history",
];

/// Validates skopeo can inspect the artifact and yields usable documents.
pub struct InspectionCheck;

impl Check for InspectionCheck {
    fn name(&self) -> &'static str {
        "Skopeo Inspect"
    }

    fn run(
        &self,
        index: usize,
        records: &[ArtifactRecord],
        _options: &ValidationOptions,
        collaborators: &Collaborators<'_>,
    ) -> Outcome {
        let Some(record) = records.get(index) else {
            return Outcome::result(CheckResult::Indeterminate);
        };
        let Some(artifact) = record.classified() else {
            return Outcome::result(CheckResult::Indeterminate);
        };

        if let Err(err) = collaborators.inspector.raw_manifest(artifact.path) {
            return Outcome::result(CheckResult::fail(err.to_string()));
        }

        let walk = for_each_platform(record, collaborators.inspector, |digest, manifest, config| {
            match required_keys(digest, manifest, config) {
                Ok(()) => Step::Continue,
                Err(reason) => Step::Stop(CheckResult::fail(reason)),
            }
        });
        match walk {
            Walk::Completed => Outcome::result(CheckResult::pass()),
            Walk::Halted(result) => Outcome::result(result),
        }
    }
}

/// Confirm both documents for one entry carry the expected keys.
fn required_keys(
    digest: &str,
    manifest: &Value,
    config: &Value,
) -> std::result::Result<(), String> {
    for (expected, document, name) in [
        (&MANIFEST_KEYS[..], manifest, "manifest"),
        (&CONFIG_KEYS[..], config, "config"),
    ] {
        let missing: Vec<&str> = expected
            .iter()
            .filter(|&&key| get_ci(document, key).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "Missing (case-insensitive) {name} key(s) in '{digest}': {missing:?}"
            ));
        }
    }
    Ok(())
}
