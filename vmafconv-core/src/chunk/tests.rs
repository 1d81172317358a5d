use std::path::PathBuf;

use super::*;

fn chunk(index: u32) -> Chunk {
  Chunk {
    temp: PathBuf::from("scratch"),
    index,
    start_frame: 120,
    end_frame: 300,
    output_ext: "mp4".to_owned(),
  }
}

#[test]
fn test_chunk_name() {
  assert_eq!("chunk1", chunk(1).name());
  assert_eq!("chunk12", chunk(12).name());
}

#[test]
fn test_chunk_paths() {
  let ch = chunk(3);
  assert_eq!(PathBuf::from("scratch/prepared/chunk3.mp4"), ch.prepared_path());
  assert_eq!(
    PathBuf::from("scratch/converted/chunk3.mp4"),
    ch.converted_path()
  );
  assert_eq!(
    PathBuf::from("scratch/converted/chunk3.vmaf.json"),
    ch.vmaf_log_path()
  );
}

#[test]
fn test_chunk_frames() {
  assert_eq!(180, chunk(1).frames());
}

#[test]
fn cut_points_follow_the_frame_over_fps_convention() {
  let ch = chunk(1);
  assert!((ch.start_secs(60) - 2.0).abs() < f64::EPSILON);
  assert!((ch.end_secs(60) - 5.0).abs() < f64::EPSILON);
}
