//! Structured metadata access over parsed manifest and config documents.
//!
//! Manifest JSON written by registries and the output of `skopeo inspect`
//! disagree about key capitalisation (`Labels` vs `labels`, `Os` vs `os`).
//! Every lookup in this crate therefore goes through [`get_ci`], which
//! behaves like `Map::get` without case sensitivity.

use serde_json::Value;
use std::fmt;

/// Look up `key` in a JSON object regardless of key case.
///
/// Returns `None` when `value` is not an object or no key matches.
#[must_use]
pub fn get_ci<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let object = value.as_object()?;
    object
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, item)| item)
}

/// An (OS, architecture) pair identifying one manifest-list member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Platform {
    /// Operating system component, e.g. `linux`.
    pub os: String,
    /// Architecture component, e.g. `amd64`.
    pub arch: String,
}

impl Platform {
    /// Build a platform from its two components.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform assumed for images whose manifests omit os/arch.
    ///
    /// Older tooling produced single images without platform items; consumers
    /// are expected to default to the local platform. The gate always runs on
    /// amd64 Linux CI workers, so the value is fixed rather than probed.
    #[must_use]
    pub fn host_default() -> Self {
        Self::new("linux", "amd64")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Extract the platform of a manifest or config document.
///
/// A missing OS falls back to the host default; a missing or null
/// architecture is an error, reported with `err_pfx` for context.
pub fn platform_of(document: &Value, err_pfx: &str) -> std::result::Result<Platform, String> {
    let os = match get_ci(document, "os") {
        Some(Value::String(os)) => os.clone(),
        Some(Value::Null) | None => Platform::host_default().os,
        Some(_) => return Err(format!("{err_pfx} non-string OS value.")),
    };
    match get_ci(document, "architecture") {
        Some(Value::String(arch)) => Ok(Platform::new(os, arch.clone())),
        Some(Value::Null) | None => Err(format!("{err_pfx} architecture value.")),
        Some(_) => Err(format!("{err_pfx} non-string architecture value.")),
    }
}

/// Extract the platform of one manifest-list entry.
///
/// An entry without a `platform` item resolves to the host default, matching
/// how image consumers treat such entries.
pub fn entry_platform(entry: &Value) -> std::result::Result<Platform, String> {
    let err_pfx = "Encountered null manifest-list item";
    match get_ci(entry, "platform") {
        Some(Value::Null) => Err(format!("{err_pfx} platform value.")),
        Some(platform) => platform_of(platform, err_pfx),
        None => Ok(Platform::host_default()),
    }
}

/// Confirm a config document agrees with an already-extracted platform.
///
/// Returns the config's platform on agreement, or a failure message.
pub fn config_agrees(
    platform: &Platform,
    config: &Value,
) -> std::result::Result<Platform, String> {
    let config_platform = platform_of(config, "Encountered null config")?;
    if *platform != config_platform {
        return Err(format!(
            "Manifest platform {platform} != config platform {config_platform}"
        ));
    }
    Ok(config_platform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("labels")]
    #[case("Labels")]
    #[case("LABELS")]
    fn get_ci_ignores_key_case(#[case] key: &str) {
        let doc = json!({"Labels": {"a": "1"}});
        assert!(get_ci(&doc, key).is_some());
    }

    #[test]
    fn get_ci_on_non_object_is_none() {
        assert!(get_ci(&json!([1, 2]), "os").is_none());
        assert!(get_ci(&json!(null), "os").is_none());
    }

    #[test]
    fn platform_of_reads_os_and_architecture() {
        let doc = json!({"Os": "linux", "Architecture": "s390x"});
        let platform = platform_of(&doc, "test");
        assert_eq!(platform, Ok(Platform::new("linux", "s390x")));
    }

    #[test]
    fn platform_of_defaults_missing_os() {
        let doc = json!({"architecture": "amd64"});
        let platform = platform_of(&doc, "test");
        assert_eq!(platform, Ok(Platform::new("linux", "amd64")));
    }

    #[test]
    fn platform_of_rejects_missing_architecture() {
        let doc = json!({"os": "linux"});
        let err = platform_of(&doc, "Encountered null").unwrap_err();
        assert!(err.contains("architecture"));
    }

    #[test]
    fn entry_platform_defaults_absent_platform_item() {
        let entry = json!({"digest": "sha256:abc"});
        assert_eq!(entry_platform(&entry), Ok(Platform::host_default()));
    }

    #[test]
    fn entry_platform_rejects_null_platform_item() {
        let entry = json!({"digest": "sha256:abc", "platform": null});
        assert!(entry_platform(&entry).is_err());
    }

    #[test]
    fn config_agrees_on_matching_platform() {
        let config = json!({"os": "linux", "architecture": "arm64"});
        let platform = Platform::new("linux", "arm64");
        assert_eq!(config_agrees(&platform, &config), Ok(platform.clone()));
    }

    #[test]
    fn config_agrees_rejects_mismatch() {
        let config = json!({"os": "linux", "architecture": "arm64"});
        let platform = Platform::new("linux", "amd64");
        let err = config_agrees(&platform, &config).unwrap_err();
        assert!(err.contains("linux/amd64"));
        assert!(err.contains("linux/arm64"));
    }

    #[test]
    fn platform_displays_with_slash() {
        assert_eq!(Platform::new("linux", "ppc64le").to_string(), "linux/ppc64le");
    }
}
