//! External metadata inspection via skopeo.
//!
//! Skopeo does some minimal internal validation of its own and provides the
//! most generally applicable view of an image, so the checks lean on it
//! heavily. The trait seam keeps the process invocation out of check logic
//! and lets tests substitute canned documents.

use crate::metadata::Platform;
use camino::Utf8Path;
use log::debug;
use serde_json::Value;
use std::process::Command;

/// Errors arising from one skopeo invocation.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// The skopeo binary could not be started.
    #[error("Unable to execute skopeo: {reason}")]
    Spawn {
        /// Description of the spawn failure.
        reason: String,
    },

    /// Skopeo ran but exited non-zero.
    #[error("Skopeo command exited non-zero: {status}")]
    NonZeroExit {
        /// The reported exit status.
        status: i32,
    },

    /// Skopeo produced output that does not parse as JSON.
    #[error("Skopeo output does not parse as JSON: '{output}'")]
    Json {
        /// The offending output, for diagnosis.
        output: String,
    },
}

/// Read-only access to image metadata for one directory.
#[cfg_attr(test, mockall::automock)]
pub trait Inspector {
    /// The raw, unmodified manifest for the whole directory.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError`] when skopeo fails or emits non-JSON.
    fn raw_manifest(&self, dir: &Utf8Path) -> Result<Value, InspectError>;

    /// The inspected manifest, scoped to `platform` for manifest-list members.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError`] when skopeo fails or emits non-JSON.
    fn manifest(&self, dir: &Utf8Path, platform: Option<Platform>) -> Result<Value, InspectError>;

    /// The image configuration, scoped to `platform` for manifest-list members.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError`] when skopeo fails or emits non-JSON.
    fn config(&self, dir: &Utf8Path, platform: Option<Platform>) -> Result<Value, InspectError>;
}

/// Inspector backed by the installed `skopeo` binary.
pub struct SkopeoInspector;

impl SkopeoInspector {
    fn inspect(
        &self,
        dir: &Utf8Path,
        platform: Option<&Platform>,
        extra: &[&str],
    ) -> Result<Value, InspectError> {
        let mut args: Vec<String> = vec!["inspect".to_owned()];
        args.extend(extra.iter().map(|&arg| arg.to_owned()));
        if let Some(platform) = platform {
            args.push("--override-arch".to_owned());
            args.push(platform.arch.clone());
            args.push("--override-os".to_owned());
            args.push(platform.os.clone());
        }
        args.push(format!("dir:{dir}"));
        run_skopeo(&args)
    }
}

impl Inspector for SkopeoInspector {
    fn raw_manifest(&self, dir: &Utf8Path) -> Result<Value, InspectError> {
        self.inspect(dir, None, &["--no-tags", "--raw"])
    }

    fn manifest(
        &self,
        dir: &Utf8Path,
        platform: Option<Platform>,
    ) -> Result<Value, InspectError> {
        self.inspect(dir, platform.as_ref(), &[])
    }

    fn config(&self, dir: &Utf8Path, platform: Option<Platform>) -> Result<Value, InspectError> {
        self.inspect(dir, platform.as_ref(), &["--config"])
    }
}

/// Execute skopeo with `args`, returning its stdout parsed as JSON.
fn run_skopeo(args: &[String]) -> Result<Value, InspectError> {
    debug!("executing skopeo {}", args.join(" "));
    let output = Command::new("skopeo")
        .args(args)
        .output()
        .map_err(|err| InspectError::Spawn {
            reason: err.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        debug!(
            "skopeo exit({:?}) output: {stdout}{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        );
        return Err(InspectError::NonZeroExit {
            status: output.status.code().unwrap_or(-1),
        });
    }

    serde_json::from_str(&stdout).map_err(|_| InspectError::Json {
        output: stdout.into_owned(),
    })
}
