#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use common::session;
use git_indexfs::fs::{IndexFsError, IndexPath, MkdirOptions};
use git_indexfs::store::{FileMode, IndexEntry, IndexStore as _, ObjectStore as _};

fn populate(fs: &git_indexfs::fs::IndexFs<common::RecordingStore>, paths: &[&str]) {
    for path in paths {
        fs.write(&fs.node(path).unwrap(), path.as_bytes()).unwrap();
    }
}

#[test]
fn renaming_a_directory_moves_its_whole_subtree() {
    let (fs, _scratch) = session();
    populate(&fs, &["src/a", "src/b/c", "src/b/d/e", "srcfile", "other"]);
    fs.mkdir(&fs.node("src/empty").unwrap(), MkdirOptions::default())
        .unwrap();
    let before: Vec<_> = ["src/a", "src/b/c", "src/b/d/e"]
        .iter()
        .map(|p| fs.store().entry(p).unwrap().object)
        .collect();

    let mut node = fs.node("src").unwrap();
    fs.rename(&mut node, &fs.node("dst").unwrap()).unwrap();

    assert_eq!(
        fs.store().paths(),
        [
            "dst/a",
            "dst/b/c",
            "dst/b/d/e",
            "dst/empty/.gitfs-placeholder",
            "other",
            "srcfile"
        ]
    );
    let after: Vec<_> = ["dst/a", "dst/b/c", "dst/b/d/e"]
        .iter()
        .map(|p| fs.store().entry(p).unwrap().object)
        .collect();
    assert_eq!(before, after);
    assert_eq!(fs.read(&fs.node("dst/b/d/e").unwrap()).unwrap(), b"src/b/d/e");
    assert!(!fs.exists(&fs.node("src").unwrap()).unwrap());
    assert!(fs.is_dir(&fs.node("dst/empty").unwrap()).unwrap());
}

#[test]
fn renaming_a_file_keeps_its_mode_and_object() {
    let (fs, _scratch) = session();
    let object = fs.store().write(b"#!/bin/sh\n").unwrap();
    fs.store()
        .update_entries(
            common::INDEX,
            &[IndexEntry {
                path: "bin/run".to_owned(),
                mode: FileMode::Executable,
                object: object.clone(),
            }],
        )
        .unwrap();

    let mut node = fs.node("bin/run").unwrap();
    fs.rename(&mut node, &fs.node("bin/start").unwrap()).unwrap();

    assert!(fs.store().entry("bin/run").is_none());
    let moved = fs.store().entry("bin/start").unwrap();
    assert_eq!(moved.mode, FileMode::Executable);
    assert_eq!(moved.object, object);
}

#[test]
fn rename_points_the_node_at_the_target() {
    let (fs, _scratch) = session();
    populate(&fs, &["old/f"]);

    let mut node = fs.node("old").unwrap();
    let target = fs.node("new").unwrap();
    fs.rename(&mut node, &target).unwrap();

    assert_eq!(node.path(), "new");
    assert!(node.try_eq(&target).unwrap());
    assert!(fs.is_dir(&node).unwrap());
}

#[test]
fn rename_is_one_update_with_tombstones_first() {
    let (fs, _scratch) = session();
    populate(&fs, &["d/x", "d/y"]);
    let before = fs.store().update_batches();

    let mut node = fs.node("d").unwrap();
    fs.rename(&mut node, &fs.node("e").unwrap()).unwrap();

    assert_eq!(fs.store().update_batches(), before + 1);
    let batch = fs.store().updates.lock().last().cloned().unwrap();
    let paths: Vec<_> = batch
        .iter()
        .map(|e| (e.path.as_str(), e.is_tombstone()))
        .collect();
    assert_eq!(
        paths,
        [
            ("d/x", true),
            ("d/y", true),
            ("e/x", false),
            ("e/y", false)
        ]
    );
}

#[test]
fn rename_into_own_subtree_leaves_nothing_at_the_old_paths() {
    let (fs, _scratch) = session();
    populate(&fs, &["a/f", "a/a/g"]);

    let mut node = fs.node("a").unwrap();
    fs.rename(&mut node, &fs.node("a/a").unwrap()).unwrap();

    assert_eq!(fs.store().paths(), ["a/a/a/g", "a/a/f"]);
    assert_eq!(fs.read(&fs.node("a/a/f").unwrap()).unwrap(), b"a/f");
}

#[test]
fn renaming_a_missing_path_fails() {
    let (fs, _scratch) = session();
    populate(&fs, &["present"]);
    let before = fs.store().update_batches();

    let mut node = fs.node("absent").unwrap();
    let err = fs
        .rename(&mut node, &fs.node("elsewhere").unwrap())
        .unwrap_err();

    assert!(matches!(err, IndexFsError::NotFound(ref p) if p == "absent"));
    assert_eq!(node.path(), "absent");
    assert_eq!(fs.store().update_batches(), before);
}

#[test]
fn renaming_onto_itself_changes_nothing() {
    let (fs, _scratch) = session();
    populate(&fs, &["same/f"]);
    let before = fs.store().update_batches();

    let mut node = fs.node("same").unwrap();
    fs.rename(&mut node, &fs.node("same").unwrap()).unwrap();

    assert_eq!(fs.store().update_batches(), before);
    assert_eq!(fs.store().paths(), ["same/f"]);
}

#[test]
fn renaming_into_another_index_is_cross_device() {
    let (fs, _scratch) = session();
    populate(&fs, &["f"]);

    let mut node = fs.node("f").unwrap();
    let other_index = IndexPath::root("test-repo", "another-index")
        .child("f")
        .unwrap();
    let other_repo = IndexPath::root("another-repo", common::INDEX)
        .child("f")
        .unwrap();

    for target in [other_index, other_repo] {
        assert!(matches!(
            fs.rename(&mut node, &target).unwrap_err(),
            IndexFsError::CrossDevice
        ));
    }
    assert_eq!(node.path(), "f");
    assert_eq!(fs.store().paths(), ["f"]);
}

#[test]
fn root_cannot_be_renamed_or_targeted() {
    let (fs, _scratch) = session();
    populate(&fs, &["f"]);

    let mut root = fs.root();
    assert!(matches!(
        fs.rename(&mut root, &fs.node("g").unwrap()).unwrap_err(),
        IndexFsError::InvalidPath { .. }
    ));

    let mut node = fs.node("f").unwrap();
    assert!(matches!(
        fs.rename(&mut node, &fs.root()).unwrap_err(),
        IndexFsError::InvalidPath { .. }
    ));
}
