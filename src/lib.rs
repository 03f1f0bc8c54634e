//! Release-gate validation for skopeo-synced container image directories.
//!
//! The gate operates on directories produced by
//! `skopeo sync -a --scoped --preserve-digests -s docker -d dir ...`. Each
//! input passes through a structural sanity stage and then an ordered set of
//! checks covering inspection, manifest consistency, labels, platform
//! coverage, cross-artifact digest matching, and CI provenance. Results are
//! append-only per artifact; the report and exit status aggregate them at
//! the end of the run.
//!
//! The binary wires [`inspect::SkopeoInspector`] and [`cirrus::CirrusClient`]
//! into [`checks::run_pipeline`]; tests substitute mocks at the same seams.

pub mod artifact;
pub mod checks;
pub mod cirrus;
pub mod cli;
pub mod digest;
pub mod error;
pub mod inspect;
pub mod metadata;
pub mod options;
pub mod report;
pub mod walk;
