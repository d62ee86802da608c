//! Manifest schema for plugin artifacts.
//!
//! The manifest is the shipped project descriptor: identity and metadata,
//! optional build/packaging configuration, development-runtime flags, and,
//! once packaging completes, the per-file hash table and aggregate
//! signature.

use crate::{ARCHIVE_EXTENSION, MANIFEST_FILE, PackError, PackResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Plugin id pattern: exactly three `[A-Za-z0-9-]+` segments joined by dots.
#[allow(clippy::expect_used)] // Safe: pattern is a literal, compiles unconditionally
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9-]+\.[A-Za-z0-9-]+\.[A-Za-z0-9-]+$").expect("valid id pattern")
});

/// Plugin manifest - the shipped descriptor for a plugin artifact.
///
/// This corresponds to the `manifest.json` file at the project root and, in
/// finalized form, at the root of the sealed archive.
///
/// `_files` and `_signature` are absent until packaging completes; once
/// present, the signature is a deterministic function of the hash table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Plugin id in `segment.segment.segment` form (e.g. "com.acme.widget").
    #[serde(default)]
    pub id: String,

    /// Plugin name; drives the artifact file name.
    #[serde(default)]
    pub name: String,

    /// Plugin version (e.g. "1.2.0").
    #[serde(default)]
    pub version: String,

    /// Short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Icon descriptor, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<IconInfo>,

    /// Build/packaging configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,

    /// Development-runtime flags; forced to disabled in a shipped artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<DevConfig>,

    /// Legacy manifests nest the dev flags as `plugin.dev`. Parsed and folded
    /// into the top-level `dev` field, never written back.
    #[serde(default, skip_serializing)]
    plugin: Option<LegacyPluginSection>,

    /// Relative path -> `sha256-<hex>` digest for every shipped file except
    /// the manifest and the key file. Populated at packaging time.
    #[serde(rename = "_files", default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, String>>,

    /// Aggregate signature over the sorted hash table. Populated at
    /// packaging time.
    #[serde(rename = "_signature", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Icon descriptor (`{"type": ..., "value": ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconInfo {
    /// Icon family (e.g. "remix").
    #[serde(rename = "type")]
    pub kind: String,

    /// Icon name within the family.
    pub value: String,
}

/// Packaging configuration under the manifest `build` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Extra project-root-relative paths staged into the shipped tree.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Installation secret placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretConfig>,

    /// Installation-time verification policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyConfig>,

    /// Version upgrade/downgrade policy. Older manifests spell this
    /// `version`; accepted as a deprecated alias.
    #[serde(
        rename = "version-policy",
        alias = "version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version_policy: Option<VersionPolicy>,
}

/// Installation secret placement: where the key is stored and which
/// platforms receive it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretConfig {
    #[serde(default)]
    pub pos: String,

    #[serde(default)]
    pub addon: Vec<String>,
}

/// Installation-time verification policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default)]
    pub enable: bool,

    #[serde(default)]
    pub online: OnlinePolicy,
}

/// When online verification runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlinePolicy {
    #[default]
    Custom,
    Always,
    Once,
}

/// Version upgrade/downgrade policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionPolicy {
    #[serde(default)]
    pub update: UpdatePolicy,

    #[serde(default)]
    pub downgrade: bool,
}

/// How version updates are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    #[default]
    Auto,
    Ask,
    Readable,
}

/// Development-runtime flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevConfig {
    /// Whether the plugin is served from a live dev server.
    #[serde(default)]
    pub enable: bool,

    /// Dev server address.
    #[serde(default)]
    pub address: String,

    /// Whether sources are loaded from disk instead of the archive.
    #[serde(default)]
    pub source: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyPluginSection {
    #[serde(default)]
    dev: Option<DevConfig>,
}

impl Manifest {
    /// Create a manifest with the required identity fields.
    #[must_use]
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: None,
            icon: None,
            build: None,
            dev: None,
            plugin: None,
            files: None,
            signature: None,
        }
    }

    /// Load and validate the manifest from a project root.
    ///
    /// Fails with [`PackError::MissingInput`] if `manifest.json` is absent
    /// and [`PackError::Validation`] if the `id` is missing or malformed.
    pub fn load(project_root: &Path) -> PackResult<Self> {
        let path = project_root.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(PackError::MissingInput(format!(
                "{} not found in {}",
                MANIFEST_FILE,
                project_root.display()
            )));
        }

        let json = fs::read_to_string(&path)?;
        let manifest = Self::from_json(&json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Deserialize from JSON, folding deprecated field shapes into the
    /// canonical ones.
    pub fn from_json(json: &str) -> PackResult<Self> {
        let mut manifest: Self = serde_json::from_str(json)?;
        if manifest.dev.is_none() {
            if let Some(legacy) = manifest.plugin.take() {
                manifest.dev = legacy.dev;
            }
        }
        manifest.plugin = None;
        Ok(manifest)
    }

    /// Serialize to pretty JSON (the on-disk manifest form).
    pub fn to_json(&self) -> PackResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize to compact JSON (the self-describing preamble form).
    pub fn to_json_compact(&self) -> PackResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Validate the manifest.
    pub fn validate(&self) -> PackResult<()> {
        if self.id.is_empty() {
            return Err(PackError::Validation("id is required".to_string()));
        }

        if !ID_PATTERN.is_match(&self.id) {
            return Err(PackError::Validation(format!(
                "id '{}' must match segment.segment.segment (segment = letters, digits, hyphen)",
                self.id
            )));
        }

        if self.name.is_empty() {
            return Err(PackError::Validation("name is required".to_string()));
        }

        if self.version.is_empty() {
            return Err(PackError::Validation("version is required".to_string()));
        }

        Ok(())
    }

    /// Attach the computed hash table and signature, and strip every live
    /// development pointer from the shipped descriptor.
    pub fn finalize(&mut self, files: BTreeMap<String, String>, signature: String) {
        self.files = Some(files);
        self.signature = Some(signature);
        self.dev = Some(DevConfig {
            enable: false,
            address: String::new(),
            source: false,
        });
    }

    /// Write the manifest JSON into a directory, overwriting any draft.
    ///
    /// Returns the written path.
    pub fn write_to(&self, dir: &Path) -> PackResult<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        fs::write(&path, self.to_json()?)?;
        Ok(path)
    }

    /// Plugin name with path-separator characters replaced by hyphens.
    #[must_use]
    pub fn sanitized_name(&self) -> String {
        self.name.replace(['/', '\\'], "-")
    }

    /// Deterministic artifact file name: `<sanitized-name>-<version>.tpex`.
    #[must_use]
    pub fn artifact_file_name(&self) -> String {
        format!(
            "{}-{}.{}",
            self.sanitized_name(),
            self.version,
            ARCHIVE_EXTENSION
        )
    }
}
