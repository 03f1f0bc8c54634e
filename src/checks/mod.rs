//! Check pipeline: result model, ordered registry, and the runner.
//!
//! Every check produces exactly one [`CheckResult`] per artifact. Checks that
//! work on behalf of the whole input set (digest matching, provenance) hand
//! sibling results back to the runner as a batch instead of mutating other
//! records directly, so each record keeps a single writer.

pub mod inspection;
pub mod labels;
pub mod manifest;
pub mod matching;
pub mod platforms;
pub mod provenance;

use crate::artifact::ArtifactRecord;
use crate::cirrus::CirrusApi;
use crate::error::Result;
use crate::inspect::Inspector;
use crate::options::ValidationOptions;
use log::debug;

/// Outcome of one check against one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Check succeeded, with an optional comment rendered after the verdict.
    Pass(Option<String>),
    /// Content or configuration problem, with a human-readable reason.
    Fail(String),
    /// Check or environment fault; distinct from a content problem.
    Indeterminate,
    /// Check was disabled for this run; never rendered.
    Skipped,
}

impl CheckResult {
    /// A plain pass without a comment.
    #[must_use]
    pub const fn pass() -> Self {
        Self::Pass(None)
    }

    /// A pass annotated with a comment.
    #[must_use]
    pub fn pass_with(comment: impl Into<String>) -> Self {
        Self::Pass(Some(comment.into()))
    }

    /// A failure carrying `reason`.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }

    /// Whether this result counts as acceptable for the exit status.
    #[must_use]
    pub const fn is_acceptable(&self) -> bool {
        matches!(self, Self::Pass(_) | Self::Skipped)
    }
}

/// What a check wants written into its own slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWrite {
    /// A definite result; overwriting an occupied slot is an error.
    Result(CheckResult),
    /// The not-applicable placeholder; ignored when the slot is occupied.
    Placeholder,
}

/// A result produced on behalf of a sibling artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingUpdate {
    /// Index of the artifact receiving the result.
    pub index: usize,
    /// The result to store under the running check's name.
    pub result: CheckResult,
}

/// Everything one check invocation hands back to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Result for the artifact the check ran against.
    pub write: SlotWrite,
    /// Batched results for sibling artifacts.
    pub siblings: Vec<SiblingUpdate>,
}

impl Outcome {
    /// An outcome consisting only of a result for the current artifact.
    #[must_use]
    pub const fn result(result: CheckResult) -> Self {
        Self {
            write: SlotWrite::Result(result),
            siblings: Vec::new(),
        }
    }

    /// The not-applicable placeholder outcome.
    #[must_use]
    pub const fn not_applicable() -> Self {
        Self {
            write: SlotWrite::Placeholder,
            siblings: Vec::new(),
        }
    }
}

/// External collaborators available to checks.
pub struct Collaborators<'a> {
    /// Per-platform metadata inspection tool.
    pub inspector: &'a dyn Inspector,
    /// Cirrus-CI GraphQL service.
    pub cirrus: &'a dyn CirrusApi,
}

/// One independent validation check.
pub trait Check {
    /// Name rendered in results and used as the record slot key.
    fn name(&self) -> &'static str;

    /// Run against `records[index]`.
    ///
    /// Records are read-only here; all writes flow back through the
    /// returned [`Outcome`].
    fn run(
        &self,
        index: usize,
        records: &[ArtifactRecord],
        options: &ValidationOptions,
        collaborators: &Collaborators<'_>,
    ) -> Outcome;
}

/// The ordered set of checks every artifact passes through.
#[must_use]
pub fn registry() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(inspection::InspectionCheck),
        Box::new(manifest::ManifestCheck),
        Box::new(labels::LabelsCheck),
        Box::new(platforms::PlatformsCheck),
        Box::new(matching::MatchingCheck),
        Box::new(provenance::ProvenanceCheck),
    ]
}

/// Run every registered check against every record, in declaration order.
///
/// Assumes all records already passed the sanity stage. Execution is strictly
/// sequential; sibling updates from one check invocation are applied before
/// the next one runs.
///
/// # Errors
///
/// Returns [`crate::error::GateError::ResultOverwrite`] if a check attempts
/// to replace a definite result that is already stored.
pub fn run_pipeline(
    records: &mut [ArtifactRecord],
    options: &ValidationOptions,
    collaborators: &Collaborators<'_>,
) -> Result<()> {
    let checks = registry();
    for index in 0..records.len() {
        debug!(
            "running checks on '{}'",
            records[index].identifier()
        );
        for check in &checks {
            let outcome = check.run(index, records, options, collaborators);
            apply(records, index, check.name(), outcome)?;
        }
    }
    Ok(())
}

/// Store one check invocation's outcome into the record set.
fn apply(
    records: &mut [ArtifactRecord],
    index: usize,
    name: &'static str,
    outcome: Outcome,
) -> Result<()> {
    for sibling in outcome.siblings {
        if let Some(record) = records.get_mut(sibling.index) {
            record.set_result(name, sibling.result)?;
        }
    }
    if let Some(record) = records.get_mut(index) {
        match outcome.write {
            SlotWrite::Result(result) => record.set_result(name, result)?,
            SlotWrite::Placeholder => record.set_placeholder(name),
        }
    }
    Ok(())
}
