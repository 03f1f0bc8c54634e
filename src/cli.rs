//! CLI argument definitions for sync-gate.
//!
//! Separated from the entrypoint so option parsing stays testable and the
//! binary stays focused on orchestration.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use clap::Parser;

/// Default registry all inputs must be served from.
const DEFAULT_REGISTRY: &str = "quay.io";

/// Platforms the multi-arch build pipeline always produces.
const DEFAULT_PLATFORMS: &str = "linux/amd64,linux/s390x,linux/ppc64le,linux/arm64";

/// Labels required on every image and manifest-list item by default.
const DEFAULT_LABELS: &str = concat!(
    "org.opencontainers.image.created,",
    "org.opencontainers.image.source,",
    "org.opencontainers.image.revision",
);

/// Validate previously synced image and manifest-list directories.
#[derive(Parser, Debug)]
#[command(name = "sync-gate")]
#[command(version, about)]
#[command(long_about = concat!(
    "Validate one or more image or manifest-list directories produced by\n",
    "`skopeo sync -a --scoped --preserve-digests -s docker -d dir ...`.\n\n",
    "Each directory is sanity-checked first; a single structural failure\n",
    "aborts the whole run. Surviving inputs then pass through an ordered set\n",
    "of consistency, coverage and provenance checks. Output lists every\n",
    "directory followed by one PASS/FAIL/INDETERMINATE line per check; the\n",
    "process exits non-zero unless everything passes.\n\n",
    "Most failure comments are terse. Re-run with --verbose to see where and\n",
    "why a check went wrong.",
))]
pub struct Cli {
    /// Show internal debugging/processing details.
    #[arg(short, long)]
    pub verbose: bool,

    /// Expected registry for all inputs (empty string disables).
    #[arg(short, long, default_value = DEFAULT_REGISTRY, value_name = "registry")]
    pub registry: String,

    /// Required CSV list of os/arch platforms (empty string disables).
    #[arg(short, long, default_value = DEFAULT_PLATFORMS, value_name = "platform CSV")]
    pub platforms: String,

    /// Required CSV list of labels (empty string disables).
    #[arg(short, long, default_value = DEFAULT_LABELS, value_name = "label CSV")]
    pub labels: String,

    /// Require all inputs to carry matching per-platform digests.
    #[arg(short, long)]
    pub matching: bool,

    /// Enable CI provenance correlation against this reference timestamp.
    #[arg(
        short,
        long,
        value_name = "iso-8601",
        value_parser = parse_timestamp,
        help = "Newest qualifying CI task completion must match <iso-8601> \
                within the tolerance window (see -d,--delta-minutes); \
                skipped by default"
    )]
    pub cirrus: Option<DateTime<Utc>>,

    /// With -c,--cirrus: ignore the revision label, correlate this commit.
    #[arg(long, value_name = "CommitID")]
    pub commit: Option<String>,

    /// Tolerance window in minutes for the -c,--cirrus comparison.
    #[arg(short, long, default_value_t = 3, value_name = "+/-min")]
    pub delta_minutes: i64,

    /// Directories written using the `dir:` containers-transport (man 5).
    #[arg(required = true, value_name = "fqin dir")]
    pub fqin_dirs: Vec<Utf8PathBuf>,
}

/// Parse an ISO-8601 timestamp CLI value into UTC.
fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("not an ISO-8601 timestamp: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_at_least_one_directory() {
        assert!(Cli::try_parse_from(["sync-gate"]).is_err());
    }

    #[test]
    fn parses_defaults() {
        let cli = Cli::try_parse_from(["sync-gate", "a/b/c:tag"]).expect("parse");
        assert_eq!(cli.registry, DEFAULT_REGISTRY);
        assert_eq!(cli.delta_minutes, 3);
        assert!(!cli.matching);
        assert!(cli.cirrus.is_none());
    }

    #[test]
    fn parses_cirrus_timestamp_to_utc() {
        let cli = Cli::try_parse_from(["sync-gate", "-c", "2024-05-01T12:30:00+02:00", "d"])
            .expect("parse");
        let reference = cli.cirrus.expect("timestamp");
        assert_eq!(reference.to_rfc3339(), "2024-05-01T10:30:00+00:00");
    }

    #[test]
    fn rejects_bad_timestamp() {
        assert!(Cli::try_parse_from(["sync-gate", "-c", "yesterday", "d"]).is_err());
    }
}
