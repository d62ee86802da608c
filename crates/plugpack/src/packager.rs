//! Packaging orchestrator.
//!
//! Sequences one packaging run end to end: rotate the previous output
//! directory aside, assemble a fresh staging tree from the host-supplied
//! build output, merge asset sources, seal the manifest with the computed
//! hash table and signature, and stream the staging tree into the final
//! `.tpex` archive.
//!
//! One run owns its staging directory and output file exclusively.
//! Concurrent runs over the same project root are not supported: the
//! staging and output paths are fixed names. The first failure aborts the
//! run; partially assembled staging trees are left in place for diagnosis.

use crate::archive::{ArchiveBuilder, ArchiveEvent, ArchiveHeader, ArchiveLimit, ArchiveStats};
use crate::assets::AssetMerger;
use crate::manifest::Manifest;
use crate::{KEY_FILE, MANIFEST_FILE, PackError, PackResult, hasher};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Name of the staging directory inside the output directory.
const STAGING_DIR: &str = "staging";

/// Length of the generated installation secret key, in hex characters.
const SECRET_KEY_LEN: usize = 32;

/// Configuration for a packaging run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackOptions {
    /// Host build output directory, relative to the project root.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    /// Output directory for the staging tree and sealed archive, relative
    /// to the project root.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Size/count ceiling for the archive. Zero fields mean unlimited.
    #[serde(default)]
    pub limit: ArchiveLimit,

    /// Write the self-describing ASCII preamble before the tar stream.
    #[serde(default)]
    pub self_describing_header: bool,

    /// Keep the staging tree after the archive is sealed (for debugging).
    #[serde(default)]
    pub keep_staging: bool,
}

fn default_build_dir() -> String {
    "dist".to_string()
}

fn default_out_dir() -> String {
    "build".to_string()
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            out_dir: default_out_dir(),
            limit: ArchiveLimit::UNLIMITED,
            self_describing_header: false,
            keep_staging: false,
        }
    }
}

/// Outcome of a successful packaging run.
#[derive(Debug, Clone)]
pub struct PackReport {
    /// Path of the sealed archive.
    pub archive_path: PathBuf,

    /// Per-file hash table embedded in the sealed manifest.
    pub files: BTreeMap<String, String>,

    /// Aggregate signature embedded in the sealed manifest.
    pub signature: String,

    /// Archive totals.
    pub stats: ArchiveStats,
}

/// Runs the packaging pipeline for one plugin project.
///
/// # Example
///
/// ```no_run
/// use plugpack::{PackOptions, Packager};
///
/// let report = Packager::new("my-plugin", PackOptions::default()).run()?;
/// println!("{} files sealed", report.files.len());
/// # Ok::<(), plugpack::PackError>(())
/// ```
pub struct Packager {
    project_root: PathBuf,
    options: PackOptions,
}

impl Packager {
    /// Create a packager for a project root.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>, options: PackOptions) -> Self {
        Self {
            project_root: project_root.into(),
            options,
        }
    }

    /// Run the pipeline, discarding progress events.
    pub fn run(&self) -> PackResult<PackReport> {
        self.run_with_events(|_| {})
    }

    /// Run the pipeline, delivering archive progress through `on_event`.
    pub fn run_with_events(
        &self,
        on_event: impl FnMut(ArchiveEvent),
    ) -> PackResult<PackReport> {
        // Validation failures must abort before any staging mutation, so the
        // manifest is loaded before the output directory is touched.
        let mut manifest = Manifest::load(&self.project_root)?;
        info!(id = %manifest.id, version = %manifest.version, "packaging");

        let out_dir = self.project_root.join(&self.options.out_dir);
        rotate_previous_output(&out_dir)?;

        let staging = out_dir.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;

        self.stage_build_artifacts(&staging, &manifest)?;
        self.merge_assets(&staging)?;

        // Draft manifest: everything except the hash table and signature.
        manifest.write_to(&staging)?;

        let key = generate_secret_key(SECRET_KEY_LEN);
        fs::write(staging.join(KEY_FILE), &key)?;

        let shippable = collect_shippable_files(&staging)?;
        let files = hasher::hash_files(&shippable, &staging)?;
        let signature = hasher::signature(&files)?;

        manifest.finalize(files.clone(), signature.clone());
        // Sealed manifest: the last write to the staging tree.
        manifest.write_to(&staging)?;

        let archive_path = out_dir.join(manifest.artifact_file_name());
        let mut builder =
            ArchiveBuilder::new(vec![staging.clone()], &archive_path).with_limit(self.options.limit);
        if self.options.self_describing_header {
            builder = builder.with_header(ArchiveHeader::new(&manifest)?);
        }
        let stats = builder.build(on_event)?;

        if self.options.keep_staging {
            debug!(staging = %staging.display(), "staging tree retained");
        } else {
            fs::remove_dir_all(&staging)?;
        }

        info!(archive = %archive_path.display(), "packaging complete");
        Ok(PackReport {
            archive_path,
            files,
            signature,
            stats,
        })
    }

    /// Copy the host-supplied build artifacts into the staging tree.
    fn stage_build_artifacts(&self, staging: &Path, manifest: &Manifest) -> PackResult<()> {
        let build_dir = self.project_root.join(&self.options.build_dir);
        if !build_dir.is_dir() {
            return Err(PackError::MissingInput(format!(
                "build output directory {} not found",
                build_dir.display()
            )));
        }

        for entry in ["index.js", "preload.js"] {
            let src = build_dir.join(entry);
            if !src.is_file() {
                return Err(PackError::MissingInput(format!(
                    "compiled entry {entry} not found in {}",
                    build_dir.display()
                )));
            }
            fs::copy(&src, staging.join(entry))?;
        }

        let widgets = build_dir.join("widgets");
        if widgets.is_dir() {
            copy_dir_recursive(&widgets, &staging.join("widgets"))?;
        }

        let build_assets = build_dir.join("assets");
        if build_assets.is_dir() {
            copy_dir_recursive(&build_assets, &staging.join("assets"))?;
        }

        let readme = self.project_root.join("README.md");
        if readme.is_file() {
            fs::copy(&readme, staging.join("README.md"))?;
        }

        if let Some(build) = &manifest.build {
            for rel in &build.files {
                self.stage_extra_file(staging, rel)?;
            }
        }

        Ok(())
    }

    /// Copy one `build.files` entry, keeping it inside the project root.
    fn stage_extra_file(&self, staging: &Path, rel: &str) -> PackResult<()> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute()
            || rel_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(PackError::Validation(format!(
                "build.files entry '{rel}' escapes the project root"
            )));
        }

        let src = self.project_root.join(rel_path);
        if !src.exists() {
            return Err(PackError::MissingInput(format!(
                "build.files entry '{rel}' not found"
            )));
        }

        let dst = staging.join(rel_path);
        if src.is_dir() {
            copy_dir_recursive(&src, &dst)?;
        } else {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dst)?;
        }
        Ok(())
    }

    /// Merge the project- and source-level asset directories into the
    /// staged asset tree.
    fn merge_assets(&self, staging: &Path) -> PackResult<()> {
        AssetMerger::new(staging.join("assets"))
            .with_source("project", self.project_root.join("assets"))
            .with_source("source", self.project_root.join("src").join("assets"))
            .merge()?;
        Ok(())
    }
}

/// Move a previous output directory aside instead of deleting it.
///
/// Keeps one prior generation under `<out_dir>.bak`; an older backup is
/// replaced.
fn rotate_previous_output(out_dir: &Path) -> PackResult<()> {
    if !out_dir.exists() {
        return Ok(());
    }

    let name = out_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let backup = out_dir.with_file_name(format!("{name}.bak"));

    if backup.is_dir() {
        fs::remove_dir_all(&backup)?;
    } else if backup.exists() {
        fs::remove_file(&backup)?;
    }

    fs::rename(out_dir, &backup)?;
    info!(backup = %backup.display(), "previous output moved aside");
    Ok(())
}

/// List every staged file that ships, excluding the manifest and key file
/// at the staging root.
fn collect_shippable_files(staging: &Path) -> PackResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(staging).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.depth() == 1 {
            if let Some(name) = entry.path().file_name() {
                if name == MANIFEST_FILE || name == KEY_FILE {
                    continue;
                }
            }
        }
        files.push(entry.into_path());
    }

    Ok(files)
}

/// Copy a directory tree, creating target directories on demand.
fn copy_dir_recursive(from: &Path, to: &Path) -> PackResult<u64> {
    let mut copied = 0;

    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry.path().strip_prefix(from).map_err(|_| {
            PackError::Validation(format!(
                "{} escaped its source root during copy",
                entry.path().display()
            ))
        })?;
        let target = to.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Generate the installation secret: `len` hex characters assembled from
/// 8-character groups drawn from the OS random source.
fn generate_secret_key(len: usize) -> String {
    let mut rng = OsRng;
    let mut key = String::with_capacity(len + 8);

    while key.len() < len {
        key.push_str(&format!("{:08x}", rng.next_u32()));
    }

    key.truncate(len);
    key
}
