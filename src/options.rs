//! Run-wide validation options.
//!
//! The command line is folded into one immutable [`ValidationOptions`] value
//! before any check executes. Checks receive it by reference; nothing in the
//! run mutates it afterwards, which keeps check functions free of ambient
//! state and lets tests construct options directly.

use crate::cli::Cli;
use crate::error::{GateError, Result};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeSet;

/// Label holding the image creation timestamp.
pub const OCI_CREATED_LABEL: &str = "org.opencontainers.image.created";
/// Label holding the source repository URL.
pub const OCI_SOURCE_LABEL: &str = "org.opencontainers.image.source";
/// Label holding the commit SHA the image was built from.
pub const OCI_REV_LABEL: &str = "org.opencontainers.image.revision";

/// Minimum labels the provenance check needs regardless of `--labels`.
#[must_use]
pub fn provenance_required_labels() -> BTreeSet<String> {
    [OCI_CREATED_LABEL, OCI_SOURCE_LABEL]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Provenance-correlation configuration; present only when `--cirrus` is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceOptions {
    /// Reference timestamp the newest qualifying task completion must match.
    pub reference: DateTime<Utc>,
    /// Tolerance window in minutes; the permitted delta is half this value
    /// either side of the reference.
    pub tolerance_minutes: i64,
    /// Commit SHA to use instead of the image's revision label.
    pub commit_override: Option<String>,
}

/// Immutable options governing a whole validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Registry every FQIN must be served from; `None` disables the check.
    pub expected_registry: Option<String>,
    /// Platform set every manifest-list must cover exactly; `None` disables.
    pub expected_platforms: Option<BTreeSet<String>>,
    /// Labels every artifact must carry; empty disables the label check.
    pub expected_labels: BTreeSet<String>,
    /// Whether cross-artifact digest matching is enabled.
    pub matching_digests: bool,
    /// CI provenance correlation, when enabled.
    pub provenance: Option<ProvenanceOptions>,
}

impl ValidationOptions {
    /// Fold the parsed command line into run options.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Usage`] for option combinations the run cannot
    /// honour: `--matching` with fewer than two inputs, or `--commit`
    /// without `--cirrus`.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.matching && cli.fqin_dirs.len() < 2 {
            return Err(GateError::Usage {
                message: "Matching (-m,--matching) option specified with only one <fqin_dir>"
                    .to_owned(),
            });
        }

        let mut expected_labels = csv_set(&cli.labels);

        let provenance = match cli.cirrus {
            Some(reference) => Some(ProvenanceOptions {
                reference,
                tolerance_minutes: cli.delta_minutes,
                commit_override: cli.commit.clone(),
            }),
            None if cli.commit.is_some() => {
                return Err(GateError::Usage {
                    message: "Can only use --commit option along with -c,--cirrus option"
                        .to_owned(),
                });
            }
            None => None,
        };

        if cli.commit.is_some() && expected_labels.remove(OCI_REV_LABEL) {
            // The revision label is probably absent; that is the whole reason
            // for having a --commit option.
            debug!("removing {OCI_REV_LABEL} from required labels, --commit is in use");
        }

        let expected_registry = non_empty(&cli.registry);
        let expected_platforms = {
            let platforms = csv_set(&cli.platforms);
            (!platforms.is_empty()).then_some(platforms)
        };

        Ok(Self {
            expected_registry,
            expected_platforms,
            expected_labels,
            matching_digests: cli.matching,
            provenance,
        })
    }
}

/// Parse a CSV option value into a set, treating an empty value as disabled.
fn csv_set(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Treat an empty or whitespace-only option value as disabled.
fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Options with every optional check disabled; the baseline for unit tests.
#[cfg(test)]
#[must_use]
pub(crate) fn test_options() -> ValidationOptions {
    ValidationOptions {
        expected_registry: None,
        expected_platforms: None,
        expected_labels: BTreeSet::new(),
        matching_digests: false,
        provenance: None,
    }
}
