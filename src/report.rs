//! Result rendering and exit-status aggregation.
//!
//! The report is the gate's contract with its caller: one block per
//! artifact, one line per stored result, and an exit status that
//! distinguishes input problems, content problems, and gate faults.

use crate::artifact::{ArtifactRecord, SANITY};
use crate::checks::CheckResult;
use crate::error::Result;
use std::io::Write;

/// Every check passed or was skipped.
pub const EXIT_OK: i32 = 0;
/// An input failed the sanity stage.
pub const EXIT_SANITY: i32 = 9;
/// At least one pipeline check failed.
pub const EXIT_CHECK_FAILURE: i32 = 10;
/// A check could not reach a verdict; the run proves nothing.
pub const EXIT_FAULT: i32 = 20;

/// Render the result report for every record.
///
/// Skipped checks leave no trace in the report; a disabled check and a
/// never-attempted one are indistinguishable by design of the output.
///
/// # Errors
///
/// Returns [`crate::error::GateError::Io`] when `out` cannot be written.
pub fn render(records: &[ArtifactRecord], out: &mut impl Write) -> Result<()> {
    for record in records {
        writeln!(out, "Validation results for '{}':", record.identifier())?;
        for (name, result) in record.results() {
            match result {
                CheckResult::Pass(None) => writeln!(out, "    {name}: PASS")?,
                CheckResult::Pass(Some(comment)) => {
                    writeln!(out, "    {name}: PASS  # {comment}")?;
                }
                CheckResult::Fail(reason) => writeln!(out, "    {name}: FAIL  # {reason}")?,
                CheckResult::Indeterminate => writeln!(out, "    {name}: INDETERMINATE")?,
                CheckResult::Skipped => {}
            }
        }
    }
    Ok(())
}

/// Worst-case exit status across every stored result.
#[must_use]
pub fn exit_status(records: &[ArtifactRecord]) -> i32 {
    let mut status = EXIT_OK;
    for record in records {
        for (name, result) in record.results() {
            let severity = match result {
                CheckResult::Pass(_) | CheckResult::Skipped => EXIT_OK,
                CheckResult::Fail(_) if name == SANITY => EXIT_SANITY,
                CheckResult::Fail(_) => EXIT_CHECK_FAILURE,
                CheckResult::Indeterminate => EXIT_FAULT,
            };
            status = status.max(severity);
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::NOT_APPLICABLE;

    fn record_with(results: &[(&'static str, CheckResult)]) -> ArtifactRecord {
        let mut record = ArtifactRecord::new("quay.io/podman/stable:v5".into());
        record.fqin = Some("quay.io/podman/stable:v5".to_owned());
        for (name, result) in results {
            record
                .set_result(name, result.clone())
                .unwrap_or_else(|_| panic!("slot '{name}' written twice"));
        }
        record
    }

    fn rendered(records: &[ArtifactRecord]) -> String {
        let mut out = Vec::new();
        render(records, &mut out).unwrap_or_else(|_| panic!("render to memory"));
        String::from_utf8(out).unwrap_or_else(|_| panic!("utf-8 report"))
    }

    #[test]
    fn report_lines_per_verdict() {
        let record = record_with(&[
            (SANITY, CheckResult::pass()),
            ("Skopeo Inspect", CheckResult::pass_with(NOT_APPLICABLE)),
            ("Expected Labels", CheckResult::fail("Missing labels: [\"x\"]")),
            ("Cirrus Timestamp", CheckResult::Indeterminate),
        ]);
        assert_eq!(
            rendered(&[record]),
            "Validation results for 'quay.io/podman/stable:v5':\n\
             \x20   Sanity: PASS\n\
             \x20   Skopeo Inspect: PASS  # N/A\n\
             \x20   Expected Labels: FAIL  # Missing labels: [\"x\"]\n\
             \x20   Cirrus Timestamp: INDETERMINATE\n"
        );
    }

    #[test]
    fn skipped_checks_leave_no_trace() {
        let record = record_with(&[
            (SANITY, CheckResult::pass()),
            ("Matching Digests", CheckResult::Skipped),
        ]);
        let report = rendered(&[record]);
        assert!(!report.contains("Matching Digests"));
    }

    #[test]
    fn all_acceptable_exits_zero() {
        let record = record_with(&[
            (SANITY, CheckResult::pass()),
            ("Matching Digests", CheckResult::Skipped),
        ]);
        assert_eq!(exit_status(&[record]), EXIT_OK);
    }

    #[test]
    fn sanity_failure_exits_nine() {
        let record = record_with(&[(SANITY, CheckResult::fail("Path does not exist"))]);
        assert_eq!(exit_status(&[record]), EXIT_SANITY);
    }

    #[test]
    fn check_failure_outranks_sanity_failure() {
        let failed_sanity = record_with(&[(SANITY, CheckResult::fail("Path does not exist"))]);
        let failed_check = record_with(&[
            (SANITY, CheckResult::pass()),
            ("Expected Labels", CheckResult::fail("Missing labels: [\"x\"]")),
        ]);
        assert_eq!(
            exit_status(&[failed_sanity, failed_check]),
            EXIT_CHECK_FAILURE
        );
    }

    #[test]
    fn indeterminate_outranks_everything() {
        let record = record_with(&[
            (SANITY, CheckResult::fail("Path does not exist")),
            ("Cirrus Timestamp", CheckResult::Indeterminate),
        ]);
        assert_eq!(exit_status(&[record]), EXIT_FAULT);
    }
}
