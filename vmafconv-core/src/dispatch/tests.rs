use std::ffi::OsStr;
use std::fs::File;

use super::*;

#[test]
fn stem_match_marks_a_file_converted_regardless_of_extension() {
  let out = tempfile::tempdir().unwrap();
  File::create(out.path().join("episode1.mkv")).unwrap();

  assert!(already_converted(out.path(), OsStr::new("episode1")));
  assert!(!already_converted(out.path(), OsStr::new("episode2")));
}

#[test]
fn missing_output_directory_means_nothing_is_converted() {
  let out = tempfile::tempdir().unwrap();
  let gone = out.path().join("nope");
  assert!(!already_converted(&gone, OsStr::new("episode1")));
}

#[test]
fn extension_matching_is_case_insensitive_and_knows_the_wildcard() {
  assert!(matches_ext(Path::new("a/video.mp4"), "mp4"));
  assert!(matches_ext(Path::new("a/video.MP4"), "mp4"));
  assert!(!matches_ext(Path::new("a/video.mkv"), "mp4"));
  assert!(!matches_ext(Path::new("a/video"), "mp4"));
  assert!(matches_ext(Path::new("a/video.anything"), "*"));
}

#[test]
fn inputs_are_filtered_and_name_sorted() {
  let root = tempfile::tempdir().unwrap();
  let input_dir = root.path().join("in");
  std::fs::create_dir(&input_dir).unwrap();
  File::create(input_dir.join("b.mp4")).unwrap();
  File::create(input_dir.join("a.mp4")).unwrap();
  File::create(input_dir.join("notes.txt")).unwrap();

  let settings = Settings {
    input_dir: input_dir.clone(),
    output_dir: root.path().join("out"),
    tmp_dir: root.path().join("tmp"),
    ..Settings::default()
  };

  let files = collect_inputs(&settings).unwrap();
  assert_eq!(
    vec![input_dir.join("a.mp4"), input_dir.join("b.mp4")],
    files
  );
}

#[test]
fn a_second_run_over_converted_inputs_is_a_no_op() {
  let root = tempfile::tempdir().unwrap();
  let input_dir = root.path().join("in");
  let output_dir = root.path().join("out");
  std::fs::create_dir(&input_dir).unwrap();
  std::fs::create_dir(&output_dir).unwrap();
  File::create(input_dir.join("a.mp4")).unwrap();
  File::create(input_dir.join("b.mp4")).unwrap();
  // Outputs for both stems already exist, under a different container even.
  File::create(output_dir.join("a.mkv")).unwrap();
  File::create(output_dir.join("b.webm")).unwrap();

  let settings = Settings {
    input_dir,
    output_dir,
    tmp_dir: root.path().join("tmp"),
    ..Settings::default()
  };

  // Every file is skipped before any probe or encode could run, so this
  // returns cleanly even though the inputs are not real videos.
  let ctx = RunContext::new();
  process_files(&settings, &ctx, Verbosity::Quiet).unwrap();
}
