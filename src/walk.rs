//! Per-platform iteration over a classified artifact.
//!
//! Every multi-step check needs the same loop: one pass per manifest-list
//! entry (or a single pass for a plain image), fetching that platform's
//! inspected manifest and config, stopping on the first terminal result.
//! Keeping the walk and its failure semantics in one place means checks only
//! supply a visitor.

use crate::artifact::ArtifactRecord;
use crate::checks::CheckResult;
use crate::inspect::Inspector;
use crate::metadata::{entry_platform, get_ci};
use log::debug;
use serde_json::Value;

/// What a visitor wants done after one platform entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Proceed to the next platform entry.
    Continue,
    /// Stop walking; this is the check's result.
    Stop(CheckResult),
}

/// How a walk over an artifact ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Walk {
    /// Every platform entry was visited without a terminal result.
    Completed,
    /// The walk stopped early with this result.
    Halted(CheckResult),
}

/// Visit every platform entry of `record`.
///
/// For a manifest-list: one visit per listed entry, with the entry's digest
/// and that platform's inspected manifest and config. For a single image:
/// exactly one visit with the record's top-level digest and no platform
/// override. Inspection failures halt the walk with a failure result.
pub fn for_each_platform<F>(
    record: &ArtifactRecord,
    inspector: &dyn Inspector,
    mut visit: F,
) -> Walk
where
    F: FnMut(&str, &Value, &Value) -> Step,
{
    let Some(artifact) = record.classified() else {
        // The pipeline only runs sanity-verified records; an unclassified one
        // here is a gate fault, not a content problem.
        return Walk::Halted(CheckResult::Indeterminate);
    };

    if !artifact.is_manifest_list {
        debug!("getting image config and manifest for '{}'", artifact.fqin);
        let config = match inspector.config(artifact.path, None) {
            Ok(config) => config,
            Err(err) => return Walk::Halted(CheckResult::fail(err.to_string())),
        };
        let manifest = match inspector.manifest(artifact.path, None) {
            Ok(manifest) => manifest,
            Err(err) => return Walk::Halted(CheckResult::fail(err.to_string())),
        };
        return match visit(artifact.manifest_digest, &manifest, &config) {
            Step::Continue => Walk::Completed,
            Step::Stop(result) => Walk::Halted(result),
        };
    }

    let Some(Value::Array(entries)) = get_ci(artifact.manifest, "manifests") else {
        // Classification guarantees an array; anything else is a gate fault.
        return Walk::Halted(CheckResult::Indeterminate);
    };

    for entry in entries {
        let digest = match get_ci(entry, "digest").and_then(Value::as_str) {
            Some(digest) => digest,
            None => {
                return Walk::Halted(CheckResult::fail(format!(
                    "Missing digest in manifest-list '{}'.",
                    artifact.fqin
                )));
            }
        };

        let platform = match entry_platform(entry) {
            Ok(platform) => platform,
            Err(reason) => return Walk::Halted(CheckResult::fail(reason)),
        };

        debug!(
            "getting manifest and config from '{}' item '{digest}' ({platform})",
            artifact.fqin
        );
        let config = match inspector.config(artifact.path, Some(platform.clone())) {
            Ok(config) => config,
            Err(err) => return Walk::Halted(CheckResult::fail(err.to_string())),
        };
        let manifest = match inspector.manifest(artifact.path, Some(platform)) {
            Ok(manifest) => manifest,
            Err(err) => return Walk::Halted(CheckResult::fail(err.to_string())),
        };

        match visit(digest, &manifest, &config) {
            Step::Continue => {}
            Step::Stop(result) => return Walk::Halted(result),
        }
    }
    Walk::Completed
}
