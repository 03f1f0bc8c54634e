//! Cirrus-CI provenance correlation.
//!
//! Confirms the image's own claims about its origin against Cirrus-CI's
//! records: the source repository must be known to Cirrus-CI, a build for
//! the labelled commit must exist on a release branch, and the newest
//! qualifying image-build task completion must land within the tolerance
//! window around the reference timestamp. Service faults are reported as
//! indeterminate rather than failures, since they say nothing about the
//! image content.

use super::{Check, CheckResult, Collaborators, Outcome};
use crate::artifact::ArtifactRecord;
use crate::checks::labels::{expected_labels_present, gather_labels};
use crate::cirrus::{CirrusApi, CirrusError, MIN_PLAUSIBLE_BUILD_ID, TaskDetail};
use crate::options::{
    OCI_CREATED_LABEL, OCI_REV_LABEL, OCI_SOURCE_LABEL, ProvenanceOptions, ValidationOptions,
    provenance_required_labels,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};

/// GitHub URL prefix the source label must carry.
const GITHUB_PREFIX: &str = "https://github.com/";

/// Commit SHAs are full 40-hex-digit values; anything shorter is suspect.
const MIN_COMMIT_LEN: usize = 40;

/// Task environment marker identifying the multi-arch cron build.
const CRON_MARKER: &str = "CIRRUS_CRON=multiarch";

/// Branches release images are built from.
const RELEASE_BRANCHES: [&str; 2] = ["main", "master"];

/// Validates image provenance against Cirrus-CI build and task records.
pub struct ProvenanceCheck;

impl Check for ProvenanceCheck {
    fn name(&self) -> &'static str {
        "Cirrus Timestamp"
    }

    fn run(
        &self,
        index: usize,
        records: &[ArtifactRecord],
        options: &ValidationOptions,
        collaborators: &Collaborators<'_>,
    ) -> Outcome {
        let Some(provenance) = &options.provenance else {
            return Outcome::result(CheckResult::Skipped);
        };
        let Some(record) = records.get(index) else {
            return Outcome::result(CheckResult::Indeterminate);
        };

        // Label gathering and well-formedness run for every record, even ones
        // later covered by the matching placeholder: a malformed label set is
        // a real problem no sibling can vouch away.
        let labels = match gather_labels(record, collaborators.inspector) {
            Ok(labels) => labels,
            Err(result) => return Outcome::result(result),
        };
        if let CheckResult::Fail(reason) = expected_labels_present(&provenance_required_labels(), &labels)
        {
            return Outcome::result(CheckResult::fail(reason));
        }

        // Presence asserted just above.
        let created_label = labels.get(OCI_CREATED_LABEL).map_or("", String::as_str);
        let image_created = match DateTime::parse_from_rfc3339(created_label) {
            Ok(created) => created.with_timezone(&Utc),
            Err(_) => {
                return Outcome::result(CheckResult::fail(format!(
                    "Unparsable {OCI_CREATED_LABEL} label '{created_label}'"
                )));
            }
        };

        let source_label = labels.get(OCI_SOURCE_LABEL).map_or("", String::as_str);
        let Some((owner, name)) = github_repo(source_label) else {
            return Outcome::result(CheckResult::fail(format!(
                "Unsupported repo '{source_label}'"
            )));
        };

        if options.matching_digests && index != 0 {
            // Matching artifacts carry identical content; one correlation
            // against the service is enough.
            return Outcome::not_applicable();
        }

        let commit = match provenance.commit_override.clone() {
            Some(commit) => commit,
            None => match labels.get(OCI_REV_LABEL) {
                Some(commit) => commit.clone(),
                None => {
                    return Outcome::result(CheckResult::fail(format!(
                        "Missing '{OCI_REV_LABEL}' label"
                    )));
                }
            },
        };
        if commit.len() < MIN_COMMIT_LEN {
            return Outcome::result(CheckResult::fail(format!("Bad CommitID '{commit}'")));
        }

        match correlate(
            collaborators.cirrus,
            provenance,
            owner,
            name,
            &commit,
            image_created,
        ) {
            Ok(result) => Outcome::result(result),
            Err(err) => {
                warn!("provenance correlation fault for '{owner}/{name}': {err}");
                Outcome::result(CheckResult::Indeterminate)
            }
        }
    }
}

/// Extract `(owner, name)` from a GitHub clone URL.
fn github_repo(url: &str) -> Option<(&str, &str)> {
    let repo = url.strip_prefix(GITHUB_PREFIX)?.strip_suffix(".git")?;
    let (owner, name) = repo.split_once('/')?;
    (!owner.is_empty() && !name.is_empty() && !name.contains('/')).then_some((owner, name))
}

/// Correlate the commit against Cirrus-CI build and task records.
///
/// # Errors
///
/// Returns [`CirrusError`] when the service cannot be queried; the caller
/// reports that as indeterminate.
fn correlate(
    cirrus: &dyn CirrusApi,
    provenance: &ProvenanceOptions,
    owner: &str,
    name: &str,
    commit: &str,
    image_created: DateTime<Utc>,
) -> Result<CheckResult, CirrusError> {
    if !cirrus.repository_exists(owner, name)? {
        return Ok(CheckResult::fail(format!(
            "Cirrus-CI unsupported repo {owner}/{name}"
        )));
    }

    let mut release_builds = Vec::new();
    for id in cirrus.builds_for_commit(owner, name, commit)? {
        if id <= MIN_PLAUSIBLE_BUILD_ID {
            debug!("ignoring implausible build ID {id}");
            continue;
        }
        let branch = cirrus.build_branch(id)?;
        if RELEASE_BRANCHES.contains(&branch.as_str()) {
            release_builds.push(id);
        }
    }
    if release_builds.is_empty() {
        return Ok(CheckResult::fail(format!(
            "No Cirrus-CI builds found for commit {commit}"
        )));
    }

    // A build started after the image existed cannot have produced it.
    let mut relevant_builds = Vec::new();
    for id in release_builds {
        if cirrus.build_created(id)? <= image_created {
            relevant_builds.push(id);
        }
    }
    if relevant_builds.is_empty() {
        return Ok(CheckResult::fail(
            "No relevant Cirrus-CI builds found".to_owned(),
        ));
    }

    let mut completions = Vec::new();
    for id in relevant_builds {
        for task in cirrus.build_tasks(id)? {
            if let Some(completed) = qualifying_completion(&task, image_created) {
                debug!("qualifying task {} completed {completed}", task.id);
                completions.push(completed);
            }
        }
    }
    let Some(latest) = completions.into_iter().max() else {
        return Ok(CheckResult::fail("No relevant tasks found".to_owned()));
    };

    // Half the window either side of the reference.
    let tolerance_seconds = provenance.tolerance_minutes * 30;
    let delta_seconds = (latest - provenance.reference).num_seconds().abs();
    if delta_seconds <= tolerance_seconds {
        Ok(CheckResult::pass_with(format!("Delta {delta_seconds}s")))
    } else {
        Ok(CheckResult::fail(format!(
            "Over +/-{tolerance_seconds}s: {delta_seconds}s"
        )))
    }
}

/// Completion time of a task that could have produced the image.
fn qualifying_completion(task: &TaskDetail, image_created: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let qualifies = task.name_alias == "image_build"
        && task.name.ends_with("stable")
        && task.status.eq_ignore_ascii_case("completed")
        && task.base_environment.iter().any(|env| env == CRON_MARKER);
    if !qualifies {
        return None;
    }
    task.final_status.filter(|&completed| completed >= image_created)
}
