//! Cross-artifact digest matching.
//!
//! When several input directories are given with `--matching`, they are
//! expected to hold the same content pulled from different registries. The
//! first artifact acts as the reference copy; it is compared against every
//! sibling, and a mismatch fails both records involved. Siblings record the
//! not-applicable placeholder unless a comparison already failed them.

use super::{Check, CheckResult, Collaborators, Outcome, SiblingUpdate, SlotWrite};
use crate::artifact::{ArtifactRecord, Classified};
use crate::inspect::Inspector;
use crate::metadata::{entry_platform, get_ci, platform_of};
use crate::options::ValidationOptions;
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

/// Validates digest equality between the first artifact and all others.
pub struct MatchingCheck;

impl Check for MatchingCheck {
    fn name(&self) -> &'static str {
        "Matching Digests"
    }

    fn run(
        &self,
        index: usize,
        records: &[ArtifactRecord],
        options: &ValidationOptions,
        collaborators: &Collaborators<'_>,
    ) -> Outcome {
        if !options.matching_digests {
            return Outcome::result(CheckResult::Skipped);
        }
        if index != 0 {
            // The reference pass already stored a failure here if one was
            // found; otherwise this artifact was vouched for.
            return Outcome::not_applicable();
        }

        let Some(prime) = records.first().and_then(ArtifactRecord::classified) else {
            return Outcome::result(CheckResult::Indeterminate);
        };

        for (other_index, other_record) in records.iter().enumerate().skip(1) {
            let Some(other) = other_record.classified() else {
                return Outcome::result(CheckResult::Indeterminate);
            };
            match digests_match(&prime, &other, collaborators.inspector) {
                Ok(true) => {
                    debug!("'{}' digests match '{}'", other.fqin, prime.fqin);
                }
                Ok(false) => {
                    return Outcome {
                        write: SlotWrite::Result(CheckResult::fail(format!(
                            "{} != {}",
                            prime.fqin, other.fqin
                        ))),
                        siblings: vec![SiblingUpdate {
                            index: other_index,
                            result: CheckResult::fail(format!(
                                "{} != {}",
                                other.fqin, prime.fqin
                            )),
                        }],
                    };
                }
                Err(result) => return Outcome::result(result),
            }
        }
        Outcome::result(CheckResult::pass_with("All digests match"))
    }
}

/// Whether two artifacts hold the same content.
///
/// Identical top-level digests settle it immediately; otherwise the
/// comparison depends on what each side is. `Err` carries a terminal result
/// for the reference artifact when a comparison cannot be made at all.
fn digests_match(
    prime: &Classified<'_>,
    other: &Classified<'_>,
    inspector: &dyn Inspector,
) -> std::result::Result<bool, CheckResult> {
    if prime.manifest_digest == other.manifest_digest {
        return Ok(true);
    }
    match (prime.is_manifest_list, other.is_manifest_list) {
        (true, true) => Ok(platform_digests(prime)? == platform_digests(other)?),
        (true, false) => list_covers_image(prime, other, inspector),
        (false, true) => list_covers_image(other, prime, inspector),
        (false, false) => Ok(same_layers(prime, other)),
    }
}

/// Platform-to-digest map from a manifest-list's entries.
fn platform_digests(
    artifact: &Classified<'_>,
) -> std::result::Result<BTreeMap<String, String>, CheckResult> {
    let Some(Value::Array(entries)) = get_ci(artifact.manifest, "manifests") else {
        return Err(CheckResult::Indeterminate);
    };
    let mut digests = BTreeMap::new();
    for entry in entries {
        let Some(digest) = get_ci(entry, "digest").and_then(Value::as_str) else {
            return Err(CheckResult::fail(format!(
                "Missing digest in manifest-list '{}'.",
                artifact.fqin
            )));
        };
        let platform = entry_platform(entry).map_err(CheckResult::fail)?;
        digests.insert(platform.to_string(), digest.to_owned());
    }
    Ok(digests)
}

/// Whether `list` carries `image`'s digest under `image`'s platform.
///
/// A manifest-list entry digest names that platform's manifest, which for a
/// synced directory is exactly the digest of the image's `manifest.json`.
fn list_covers_image(
    list: &Classified<'_>,
    image: &Classified<'_>,
    inspector: &dyn Inspector,
) -> std::result::Result<bool, CheckResult> {
    let manifest = inspector
        .manifest(image.path, None)
        .map_err(|err| CheckResult::fail(err.to_string()))?;
    let platform = platform_of(&manifest, "Encountered null manifest").map_err(CheckResult::fail)?;
    let digests = platform_digests(list)?;
    Ok(digests.get(&platform.to_string()).map(String::as_str) == Some(image.manifest_digest))
}

/// Whether two simple images list the same layer digests.
fn same_layers(prime: &Classified<'_>, other: &Classified<'_>) -> bool {
    let prime_layers = get_ci(prime.manifest, "layers");
    let other_layers = get_ci(other.manifest, "layers");
    prime_layers.is_some() && prime_layers == other_layers
}
