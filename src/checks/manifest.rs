//! Manifest/config consistency check.
//!
//! A somewhat simplistic validation that platform entries do not share
//! configs or layers, that platforms agree between manifest-list, manifest,
//! and config, and that layer lists are sane. Uniqueness is judged after the
//! walk so a duplicate anywhere in the artifact is caught even when the
//! individual entries look fine.

use super::{Check, CheckResult, Collaborators, Outcome};
use crate::artifact::ArtifactRecord;
use crate::digest::canonical_digest;
use crate::metadata::{config_agrees, entry_platform, get_ci, platform_of};
use crate::options::ValidationOptions;
use crate::walk::{Step, Walk, for_each_platform};
use log::debug;
use serde_json::Value;
use std::collections::BTreeSet;

/// Validates image/manifest-list contents are consistent with no duplication.
pub struct ManifestCheck;

/// Digest and platform sets accumulated across one artifact's entries.
#[derive(Debug, Default)]
struct Gathered {
    expected_platforms: Vec<String>,
    manifest_digests: Vec<String>,
    config_digests: Vec<String>,
    comp_layer_digests: Vec<String>,
    uncomp_layer_digests: Vec<String>,
}

impl Gathered {
    /// The accumulated sets, paired with the names used in failure messages.
    fn named_sets(&self) -> [(&'static str, &Vec<String>); 5] {
        [
            ("expected_platforms", &self.expected_platforms),
            ("manifest_digests", &self.manifest_digests),
            ("config_digests", &self.config_digests),
            ("comp_layer_digests", &self.comp_layer_digests),
            ("uncomp_layer_digests", &self.uncomp_layer_digests),
        ]
    }
}

impl Check for ManifestCheck {
    fn name(&self) -> &'static str {
        "Manifest Consistency"
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

        let mut gathered = Gathered::default();
        if let Err(reason) = prime_expected(artifact.manifest, artifact.is_manifest_list, &mut gathered)
        {
            return Outcome::result(CheckResult::fail(reason));
        }

        let is_manifest_list = artifact.is_manifest_list;
        let walk = for_each_platform(record, collaborators.inspector, |digest, manifest, config| {
            entry_consistency(digest, manifest, config, is_manifest_list, &mut gathered)
        });
        if let Walk::Halted(result) = walk {
            return Outcome::result(result);
        }

        // Checking expected_platforms here may seem pointless, but it proves
        // there is at most one manifest-list entry per platform, which the
        // coverage check does not.
        for (name, values) in gathered.named_sets() {
            if let Some(duplicate) = first_duplicate(values) {
                debug!("duplicate {name} item {duplicate} in {values:?}");
                return Outcome::result(CheckResult::fail(format!(
                    "Found duplicated {name} item."
                )));
            }
        }
        Outcome::result(CheckResult::pass())
    }
}

/// Pre-pass over the top-level manifest gathering digests and platforms.
fn prime_expected(
    manifest: &Value,
    is_manifest_list: bool,
    gathered: &mut Gathered,
) -> std::result::Result<(), String> {
    if !is_manifest_list {
        let platform = platform_of(manifest, "Encountered null image")?;
        gathered.expected_platforms.push(platform.to_string());
        return Ok(());
    }

    let Some(Value::Array(entries)) = get_ci(manifest, "manifests") else {
        return Err("Present manifest 'manifests' item is a non-list".to_owned());
    };
    for entry in entries {
        let Some(digest) = get_ci(entry, "digest").and_then(Value::as_str) else {
            return Err("Found null digest in manifests list".to_owned());
        };
        gathered.manifest_digests.push(digest.to_owned());
        let platform = entry_platform(entry)?;
        gathered.expected_platforms.push(platform.to_string());
    }
    Ok(())
}

/// Per-entry consistency validation; accumulates into `gathered`.
fn entry_consistency(
    digest: &str,
    manifest: &Value,
    config: &Value,
    is_manifest_list: bool,
    gathered: &mut Gathered,
) -> Step {
    // The config digest is not reachable through skopeo for manifest-list
    // members, but uniqueness only needs a stable identity, so a canonical
    // re-serialization hash is good enough.
    let config_digest = match canonical_digest(config) {
        Ok(config_digest) => config_digest,
        Err(_) => return Step::Stop(CheckResult::Indeterminate),
    };
    gathered.config_digests.push(config_digest);

    let manifest_platform = match platform_of(manifest, "Encountered null manifest") {
        Ok(platform) => platform,
        Err(reason) => return Step::Stop(CheckResult::fail(reason)),
    };
    if let Err(reason) = config_agrees(&manifest_platform, config) {
        return Step::Stop(CheckResult::fail(reason));
    }

    // Not the same membership test as the coverage check: this one is against
    // the platforms the artifact itself declares.
    let platform_name = manifest_platform.to_string();
    if !gathered.expected_platforms.contains(&platform_name) {
        return Step::Stop(CheckResult::fail(format!(
            "Manifest platform {platform_name} not in {:?}",
            gathered.expected_platforms
        )));
    }

    // No need to validate the digest values themselves; the image simply
    // will not work if they are wrong.
    let comp_layers = layer_list(manifest, "layers");
    if comp_layers.is_empty() {
        return Step::Stop(CheckResult::fail(
            "Found unset or empty layers (case-insensitive) in manifest.",
        ));
    }
    gathered.comp_layer_digests.extend(comp_layers);

    let Some(rootfs) = get_ci(config, "rootfs") else {
        return Step::Stop(CheckResult::fail("Config rootfs is missing"));
    };
    let rootfs_type = get_ci(rootfs, "type").and_then(Value::as_str).unwrap_or("");
    if !rootfs_type.eq_ignore_ascii_case("layers") {
        return Step::Stop(CheckResult::fail(format!(
            "Config for '{digest}' rootfs not type=layers"
        )));
    }

    let uncomp_layers = layer_list(rootfs, "diff_ids");
    if uncomp_layers.is_empty() {
        return Step::Stop(CheckResult::fail(
            "Config rootfs layers (diff_ids) is empty or unset",
        ));
    }
    if uncomp_layers.iter().any(String::is_empty) {
        if !is_manifest_list {
            // Historical carve-out: some older simple images carry a list of
            // empty diff_ids, e.g. quay.io/podman/stable:v2.1.1.
            debug!("tolerating empty diff_ids entry in simple-image config");
            return Step::Continue;
        }
        return Step::Stop(CheckResult::fail("\"\" in diff_ids for manifest-list config"));
    }
    gathered.uncomp_layer_digests.extend(uncomp_layers);
    Step::Continue
}

/// Extract a list of layer identifier strings under `key`, if present.
fn layer_list(document: &Value, key: &str) -> Vec<String> {
    get_ci(document, key)
        .and_then(Value::as_array)
        .map(|layers| {
            layers
                .iter()
                .map(|layer| layer.as_str().unwrap_or_default().to_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// The first value appearing more than once, if any.
fn first_duplicate(values: &[String]) -> Option<&String> {
    let mut seen = BTreeSet::new();
    values.iter().find(|value| !seen.insert(value.as_str()))
}
