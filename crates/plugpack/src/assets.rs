//! Asset source merging with conflict detection.
//!
//! A plugin's static assets can come from up to three places: the asset
//! tree already present in the build output (staged first, the "base"), a
//! project-level `assets/` directory, and a source-level `src/assets/`
//! directory. The merger unifies them into the staged asset tree and fails
//! closed when any relative path appears in more than one source.

use crate::{AssetConflict, PackError, PackResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Label of the base source (the staged build-output assets).
const BASE_LABEL: &str = "build";

/// Merges supplementary asset directories into the staged asset tree.
///
/// Conflict detection runs over the relative file lists of every source,
/// the base tree included, before a single byte is copied. A non-empty
/// intersection between any two sources aborts the merge with the full
/// conflict list and leaves the destination untouched.
pub struct AssetMerger {
    dest: PathBuf,
    sources: Vec<AssetSource>,
}

struct AssetSource {
    label: String,
    root: PathBuf,
}

impl AssetMerger {
    /// Create a merger over the staged asset tree at `dest`.
    ///
    /// `dest` doubles as the base source: whatever the build output already
    /// staged there participates in conflict detection under the label
    /// `build`.
    #[must_use]
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            sources: Vec::new(),
        }
    }

    /// Add a supplementary source directory under a label.
    ///
    /// Sources are copied in the order they were added. A source that does
    /// not exist on disk is skipped silently.
    #[must_use]
    pub fn with_source(mut self, label: &str, root: impl Into<PathBuf>) -> Self {
        self.sources.push(AssetSource {
            label: label.to_string(),
            root: root.into(),
        });
        self
    }

    /// Merge every existing source into the destination tree.
    ///
    /// Returns the number of files copied.
    pub fn merge(&self) -> PackResult<usize> {
        fs::create_dir_all(&self.dest)?;

        // Enumerate everything up front: conflicts must be detected before
        // any copy happens.
        let mut listings: Vec<(&str, Vec<String>)> =
            vec![(BASE_LABEL, list_relative_files(&self.dest)?)];
        for source in &self.sources {
            if !source.root.exists() {
                debug!(source = %source.label, "asset source absent, skipping");
                continue;
            }
            listings.push((source.label.as_str(), list_relative_files(&source.root)?));
        }

        let mut occurrences: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (label, files) in &listings {
            for path in files {
                occurrences.entry(path.as_str()).or_default().push(*label);
            }
        }

        let conflicts: Vec<AssetConflict> = occurrences
            .iter()
            .filter(|(_, labels)| labels.len() > 1)
            .map(|(path, labels)| AssetConflict {
                path: (*path).to_string(),
                sources: labels.iter().map(|l| (*l).to_string()).collect(),
            })
            .collect();

        if !conflicts.is_empty() {
            return Err(PackError::AssetConflict { conflicts });
        }

        let mut copied = 0;
        for source in &self.sources {
            if !source.root.exists() {
                continue;
            }
            for rel in list_relative_files(&source.root)? {
                let from = source.root.join(&rel);
                let to = self.dest.join(&rel);
                if let Some(parent) = to.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&from, &to)?;
                copied += 1;
            }
        }

        info!(copied, dest = %self.dest.display(), "asset merge complete");
        Ok(copied)
    }
}

/// List every file under `root`, as forward-slash paths relative to `root`.
///
/// Recurses into subdirectories; directory entries themselves are not
/// listed. Traversal order is lexicographic.
fn list_relative_files(root: &Path) -> PackResult<Vec<String>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry.path().strip_prefix(root).map_err(|_| {
            PackError::Validation(format!(
                "{} escaped its source root during enumeration",
                entry.path().display()
            ))
        })?;
        files.push(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
        );
    }

    Ok(files)
}

#[cfg(test)]
#[path = "assets/assets_tests.rs"]
mod assets_tests;
