//! Content hashing for shipped file sets.
//!
//! Per-file integrity uses SHA-256 over the raw file bytes. The aggregate
//! signature over the whole hash table is a Base64-encoded MD5 of the
//! table's canonical JSON form.

use crate::{PackError, PackResult};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Hash every file in `paths`, keyed by its path relative to `base_dir`.
///
/// Keys use forward-slash separators regardless of platform, so the table
/// is stable across operating systems. Values are `sha256-<hex>` digest
/// strings. The whole operation aborts on the first unreadable file; a
/// partial hash table is never returned.
pub fn hash_files(paths: &[PathBuf], base_dir: &Path) -> PackResult<BTreeMap<String, String>> {
    let mut table = BTreeMap::new();

    for path in paths {
        let contents = fs::read(path).map_err(|e| {
            PackError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {e}", path.display()),
            ))
        })?;

        table.insert(
            relative_key(path, base_dir)?,
            format!("sha256-{}", compute_sha256(&contents)),
        );
    }

    Ok(table)
}

/// Compute the SHA-256 hash of data and return it as a hex string.
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the aggregate signature of a hash table.
///
/// The table is serialized to compact JSON in sorted key order (the
/// `BTreeMap` iteration order), MD5-digested, and Base64-encoded. The result
/// is reproducible for identical contents and paths regardless of how the
/// table was built.
///
/// MD5 here is a deliberate format decision, not an oversight: the signature
/// is a corruption fingerprint for the table itself, while tamper evidence
/// comes from the per-file SHA-256 digests. Installers already validate this
/// exact MD5-based format, so it must not be upgraded silently.
pub fn signature(table: &BTreeMap<String, String>) -> PackResult<String> {
    let canonical = serde_json::to_string(table)?;
    let digest = md5::compute(canonical.as_bytes());
    Ok(BASE64.encode(digest.0))
}

fn relative_key(path: &Path, base: &Path) -> PackResult<String> {
    let rel = path.strip_prefix(base).map_err(|_| {
        PackError::Validation(format!(
            "{} is outside the hashed base directory {}",
            path.display(),
            base.display()
        ))
    })?;

    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use std::fs;

    #[test]
    fn compute_sha256___returns_known_digest() {
        let digest = compute_sha256(b"hello world");

        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn hash_files___keys_are_relative_with_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("widgets")).unwrap();
        fs::write(dir.path().join("index.js"), b"entry").unwrap();
        fs::write(dir.path().join("widgets/clock.js"), b"widget").unwrap();

        let paths = vec![
            dir.path().join("index.js"),
            dir.path().join("widgets/clock.js"),
        ];
        let table = hash_files(&paths, dir.path()).unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.contains_key("index.js"));
        assert!(table.contains_key("widgets/clock.js"));
        assert!(table.values().all(|v| v.starts_with("sha256-")));
    }

    #[test]
    fn hash_files___is_invariant_under_input_reordering() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), b"aaa").unwrap();
        fs::write(dir.path().join("b.js"), b"bbb").unwrap();

        let forward = vec![dir.path().join("a.js"), dir.path().join("b.js")];
        let reversed = vec![dir.path().join("b.js"), dir.path().join("a.js")];

        assert_eq!(
            hash_files(&forward, dir.path()).unwrap(),
            hash_files(&reversed, dir.path()).unwrap()
        );
    }

    #[test]
    fn hash_files___aborts_on_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), b"aaa").unwrap();

        let paths = vec![dir.path().join("a.js"), dir.path().join("missing.js")];
        let result = hash_files(&paths, dir.path());

        assert!(matches!(result, Err(PackError::Io(_))));
    }

    #[test]
    fn signature___matches_canonical_json_fingerprint() {
        let mut table = BTreeMap::new();
        table.insert("index.js".to_string(), "sha256-abc".to_string());

        let expected = BASE64.encode(md5::compute(br#"{"index.js":"sha256-abc"}"#).0);

        assert_eq!(signature(&table).unwrap(), expected);
    }

    #[test]
    fn signature___is_invariant_under_insertion_order() {
        let mut forward = BTreeMap::new();
        forward.insert("a.js".to_string(), "sha256-1".to_string());
        forward.insert("b.js".to_string(), "sha256-2".to_string());

        let mut reversed = BTreeMap::new();
        reversed.insert("b.js".to_string(), "sha256-2".to_string());
        reversed.insert("a.js".to_string(), "sha256-1".to_string());

        assert_eq!(
            signature(&forward).unwrap(),
            signature(&reversed).unwrap()
        );
    }

    #[test]
    fn signature___differs_for_different_tables() {
        let mut one = BTreeMap::new();
        one.insert("a.js".to_string(), "sha256-1".to_string());

        let mut two = BTreeMap::new();
        two.insert("a.js".to_string(), "sha256-2".to_string());

        assert_ne!(signature(&one).unwrap(), signature(&two).unwrap());
    }
}
