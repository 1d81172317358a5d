use std::fs::{self, File};

use super::*;

#[test]
fn scratch_tree_is_created_and_wiped() {
  let root = tempfile::tempdir().unwrap();
  let scratch = root.path().join("episode1");

  prepare_scratch(&scratch).unwrap();
  assert!(scratch.join("prepared").is_dir());
  assert!(scratch.join("converted").is_dir());

  // Leftovers from an earlier run disappear on the next prepare.
  let stale = scratch.join("prepared").join("chunk1.mp4");
  File::create(&stale).unwrap();
  prepare_scratch(&scratch).unwrap();
  assert!(!stale.exists());
  assert!(scratch.join("converted").is_dir());
}

#[test]
fn run_cleanup_removes_the_scratch_root() {
  let root = tempfile::tempdir().unwrap();
  let tmp_dir = root.path().join("tmp");
  fs::create_dir_all(tmp_dir.join("episode1")).unwrap();

  clean_run(&tmp_dir, false);
  assert!(!tmp_dir.exists());
}

#[test]
fn run_cleanup_honors_keep_tmp_files() {
  let root = tempfile::tempdir().unwrap();
  let tmp_dir = root.path().join("tmp");
  fs::create_dir_all(tmp_dir.join("episode1")).unwrap();

  clean_run(&tmp_dir, true);
  assert!(tmp_dir.join("episode1").is_dir());
}
