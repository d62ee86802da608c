#![allow(non_snake_case)]

use super::*;
use tempfile::TempDir;

fn write_file(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

#[test]
fn AssetMerger___merge___with_no_sources_copies_nothing() {
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("assets");

    let copied = AssetMerger::new(&dest).merge().unwrap();

    assert_eq!(copied, 0);
    assert!(dest.exists());
}

#[test]
fn AssetMerger___merge___copies_sources_in_order() {
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("assets");
    let project = tmp.path().join("project-assets");
    let source = tmp.path().join("src-assets");
    write_file(&project, "logo.png", b"logo");
    write_file(&source, "icons/app.svg", b"icon");

    let copied = AssetMerger::new(&dest)
        .with_source("project", &project)
        .with_source("source", &source)
        .merge()
        .unwrap();

    assert_eq!(copied, 2);
    assert_eq!(fs::read(dest.join("logo.png")).unwrap(), b"logo");
    assert_eq!(fs::read(dest.join("icons/app.svg")).unwrap(), b"icon");
}

#[test]
fn AssetMerger___merge___skips_absent_sources() {
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("assets");
    let project = tmp.path().join("project-assets");
    write_file(&project, "logo.png", b"logo");

    let copied = AssetMerger::new(&dest)
        .with_source("project", &project)
        .with_source("source", tmp.path().join("does-not-exist"))
        .merge()
        .unwrap();

    assert_eq!(copied, 1);
}

#[test]
fn AssetMerger___merge___fails_closed_on_supplementary_conflict() {
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("assets");
    let project = tmp.path().join("project-assets");
    let source = tmp.path().join("src-assets");
    write_file(&project, "logo.png", b"from project");
    write_file(&project, "unique.css", b"css");
    write_file(&source, "logo.png", b"from source");

    let result = AssetMerger::new(&dest)
        .with_source("project", &project)
        .with_source("source", &source)
        .merge();

    let err = result.unwrap_err();
    match err {
        PackError::AssetConflict { conflicts } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].path, "logo.png");
            assert_eq!(conflicts[0].sources, vec!["project", "source"]);
        }
        other => panic!("expected AssetConflict, got {other}"),
    }

    // Fail-closed law: zero writes to the destination, including the
    // non-conflicting file.
    assert!(!dest.join("logo.png").exists());
    assert!(!dest.join("unique.css").exists());
}

#[test]
fn AssetMerger___merge___detects_conflict_with_base_tree() {
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("assets");
    let project = tmp.path().join("project-assets");
    write_file(&dest, "style.css", b"staged");
    write_file(&project, "style.css", b"project");

    let result = AssetMerger::new(&dest)
        .with_source("project", &project)
        .merge();

    match result.unwrap_err() {
        PackError::AssetConflict { conflicts } => {
            assert_eq!(conflicts[0].sources, vec!["build", "project"]);
        }
        other => panic!("expected AssetConflict, got {other}"),
    }

    // The staged copy is untouched.
    assert_eq!(fs::read(dest.join("style.css")).unwrap(), b"staged");
}

#[test]
fn AssetMerger___merge___reports_every_conflicting_path() {
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("assets");
    let project = tmp.path().join("project-assets");
    let source = tmp.path().join("src-assets");
    write_file(&project, "a.png", b"1");
    write_file(&project, "b.png", b"1");
    write_file(&source, "a.png", b"2");
    write_file(&source, "b.png", b"2");

    let result = AssetMerger::new(&dest)
        .with_source("project", &project)
        .with_source("source", &source)
        .merge();

    match result.unwrap_err() {
        PackError::AssetConflict { conflicts } => {
            let paths: Vec<&str> = conflicts.iter().map(|c| c.path.as_str()).collect();
            assert_eq!(paths, vec!["a.png", "b.png"]);
        }
        other => panic!("expected AssetConflict, got {other}"),
    }
}

#[test]
fn list_relative_files___recurses_and_sorts() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "b.txt", b"b");
    write_file(tmp.path(), "a/nested.txt", b"n");
    write_file(tmp.path(), "a.txt", b"a");

    let files = list_relative_files(tmp.path()).unwrap();

    assert_eq!(files, vec!["a/nested.txt", "a.txt", "b.txt"]);
}
