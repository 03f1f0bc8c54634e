//! Platform coverage check.
//!
//! Confirms platforms agree between manifest and config, then that a
//! manifest-list covers the configured platform set exactly: nothing
//! missing, nothing extra. A simple image instead must resolve to exactly
//! one platform belonging to the set.

use super::{Check, CheckResult, Collaborators, Outcome};
use crate::artifact::ArtifactRecord;
use crate::metadata::{config_agrees, platform_of};
use crate::options::ValidationOptions;
use crate::walk::{Step, Walk, for_each_platform};
use log::debug;
use std::collections::BTreeSet;

/// Validates artifact platforms against the expected platform set.
pub struct PlatformsCheck;

impl Check for PlatformsCheck {
    fn name(&self) -> &'static str {
        "Expected Platforms"
    }

    fn run(
        &self,
        index: usize,
        records: &[ArtifactRecord],
        options: &ValidationOptions,
        collaborators: &Collaborators<'_>,
    ) -> Outcome {
        let Some(record) = records.get(index) else {
            return Outcome::result(CheckResult::Indeterminate);
        };

        // Accumulated as a list first: other checks assert there are no
        // duplicate entries, but that is not a safe assumption here.
        let mut found: Vec<String> = Vec::new();
        let walk = for_each_platform(record, collaborators.inspector, |_, manifest, config| {
            let manifest_platform = match platform_of(manifest, "Encountered null manifest") {
                Ok(platform) => platform,
                Err(reason) => return Step::Stop(CheckResult::fail(reason)),
            };
            let config_platform = match config_agrees(&manifest_platform, config) {
                Ok(platform) => platform,
                Err(reason) => return Step::Stop(CheckResult::fail(reason)),
            };
            found.push(manifest_platform.to_string());
            found.push(config_platform.to_string());
            Step::Continue
        });
        if let Walk::Halted(result) = walk {
            return Outcome::result(result);
        }

        let Some(expected) = &options.expected_platforms else {
            return Outcome::result(CheckResult::Skipped);
        };

        let actual: BTreeSet<&str> = found.iter().map(String::as_str).collect();
        debug!("validating found platforms: {actual:?}");
        if record.is_manifest_list {
            Outcome::result(list_coverage(expected, &actual))
        } else {
            Outcome::result(image_coverage(expected, &actual))
        }
    }
}

/// A manifest-list must cover the expected set exactly.
fn list_coverage(expected: &BTreeSet<String>, actual: &BTreeSet<&str>) -> CheckResult {
    let missing: Vec<&str> = expected
        .iter()
        .map(String::as_str)
        .filter(|platform| !actual.contains(platform))
        .collect();
    if !missing.is_empty() {
        return CheckResult::fail(format!(
            "Manifest-list missing expected platforms: {missing:?}"
        ));
    }
    let extra: Vec<&str> = actual
        .iter()
        .copied()
        .filter(|platform| !expected.contains(*platform))
        .collect();
    if !extra.is_empty() {
        return CheckResult::fail(format!(
            "Manifest-list has extra/unexpected platforms: {extra:?}"
        ));
    }
    CheckResult::pass()
}

/// A simple image must resolve to exactly one expected platform.
fn image_coverage(expected: &BTreeSet<String>, actual: &BTreeSet<&str>) -> CheckResult {
    if actual.len() != 1 {
        return CheckResult::fail(format!(
            "Expecting exactly one platform not {}",
            actual.len()
        ));
    }
    match actual.iter().next() {
        Some(platform) if expected.contains(*platform) => CheckResult::pass(),
        Some(platform) => CheckResult::fail(format!("Unexpected platform {platform}")),
        None => CheckResult::Indeterminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::SlotWrite;
    use crate::cirrus::MockCirrusApi;
    use crate::inspect::MockInspector;
    use crate::options::test_options;
    use crate::walk::tests::{list_manifest, record_for};
    use serde_json::json;

    fn platform_documents(inspector: &mut MockInspector) {
        inspector.expect_config().returning(|_, platform| {
            let arch = platform.map(|p| p.arch).unwrap_or_else(|| "amd64".into());
            Ok(json!({"os": "linux", "architecture": arch}))
        });
        inspector.expect_manifest().returning(|_, platform| {
            let arch = platform.map(|p| p.arch).unwrap_or_else(|| "amd64".into());
            Ok(json!({"Os": "linux", "Architecture": arch}))
        });
    }

    fn run_check(
        record: ArtifactRecord,
        inspector: &MockInspector,
        expected: Option<&[&str]>,
    ) -> CheckResult {
        let mut options = test_options();
        options.expected_platforms =
            expected.map(|set| set.iter().map(|&platform| platform.to_owned()).collect());
        let cirrus = MockCirrusApi::new();
        let outcome = PlatformsCheck.run(
            0,
            &[record],
            &options,
            &Collaborators {
                inspector,
                cirrus: &cirrus,
            },
        );
        match outcome.write {
            SlotWrite::Result(result) => result,
            SlotWrite::Placeholder => panic!("unexpected placeholder"),
        }
    }

    fn list_record(platforms: &[(&str, &str)]) -> ArtifactRecord {
        record_for("quay.io/podman/stable:latest", list_manifest(platforms), true)
    }

    #[test]
    fn exact_coverage_passes() {
        let record = list_record(&[("linux", "amd64"), ("linux", "arm64")]);
        let mut inspector = MockInspector::new();
        platform_documents(&mut inspector);
        let result = run_check(record, &inspector, Some(&["linux/amd64", "linux/arm64"]));
        assert_eq!(result, CheckResult::pass());
    }

    #[test]
    fn missing_platform_is_cited() {
        let record = list_record(&[("linux", "amd64")]);
        let mut inspector = MockInspector::new();
        platform_documents(&mut inspector);
        let result = run_check(record, &inspector, Some(&["linux/amd64", "linux/arm64"]));
        assert_eq!(
            result,
            CheckResult::fail("Manifest-list missing expected platforms: [\"linux/arm64\"]")
        );
    }

    #[test]
    fn extra_platform_is_cited() {
        let record = list_record(&[("linux", "amd64"), ("linux", "riscv64")]);
        let mut inspector = MockInspector::new();
        platform_documents(&mut inspector);
        let result = run_check(record, &inspector, Some(&["linux/amd64", "linux/riscv64", "linux/arm64"]));
        assert!(matches!(result, CheckResult::Fail(reason)
            if reason.contains("missing expected platforms")));
    }

    #[test]
    fn unexpected_extra_platform_fails() {
        let record = list_record(&[("linux", "amd64"), ("linux", "riscv64")]);
        let mut inspector = MockInspector::new();
        platform_documents(&mut inspector);
        let result = run_check(record, &inspector, Some(&["linux/amd64"]));
        assert_eq!(
            result,
            CheckResult::fail("Manifest-list has extra/unexpected platforms: [\"linux/riscv64\"]")
        );
    }

    #[test]
    fn disabled_expected_set_skips_after_walk() {
        let record = list_record(&[("linux", "amd64")]);
        let mut inspector = MockInspector::new();
        platform_documents(&mut inspector);
        assert_eq!(run_check(record, &inspector, None), CheckResult::Skipped);
    }

    #[test]
    fn image_must_match_one_expected_platform() {
        let record = record_for("quay.io/podman/stable:v5", json!({}), false);
        let mut inspector = MockInspector::new();
        platform_documents(&mut inspector);
        let result = run_check(record, &inspector, Some(&["linux/arm64"]));
        assert_eq!(result, CheckResult::fail("Unexpected platform linux/amd64"));
    }

    #[test]
    fn image_in_expected_set_passes() {
        let record = record_for("quay.io/podman/stable:v5", json!({}), false);
        let mut inspector = MockInspector::new();
        platform_documents(&mut inspector);
        let result = run_check(record, &inspector, Some(&["linux/amd64", "linux/arm64"]));
        assert_eq!(result, CheckResult::pass());
    }
}
