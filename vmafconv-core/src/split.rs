
use std::iter;
use std::path::Path;

use anyhow::ensure;
use itertools::Itertools;

use crate::chunk::Chunk;
use crate::settings::Settings;
use crate::ChunkMode;

/// Produces the chunk descriptors for one input file.
///
/// For every strategy the descriptors are contiguous, non-overlapping, cover
/// exactly `[0, total_frames)`, and carry dense 1-based indices.
/// `keyframe_pts` is only consulted in keyframe mode and holds the
/// `pts_time` of every keyframe-flagged packet reported by ffprobe.
pub fn plan_chunks(
  settings: &Settings,
  temp: &Path,
  total_frames: u64,
  fps: u32,
  keyframe_pts: &[f64],
) -> anyhow::Result<Vec<Chunk>> {
  ensure!(total_frames > 0, "cannot chunk a video with no frames");

  let boundaries = interior_boundaries(
    settings.chunk_mode,
    total_frames,
    fps,
    settings.chunk_size,
    settings.chunk_length,
    keyframe_pts,
  );

  let chunks = iter::once(0)
    .chain(boundaries)
    .chain(iter::once(total_frames))
    .tuple_windows()
    .enumerate()
    .map(|(i, (start_frame, end_frame))| Chunk {
      temp: temp.to_path_buf(),
      index: i as u32 + 1,
      start_frame,
      end_frame,
      output_ext: settings.output_ext.clone(),
    })
    .collect();

  Ok(chunks)
}

/// Split points strictly inside `(0, total_frames)`, strictly increasing.
/// Everything that would produce an empty chunk is dropped here, so the
/// window construction above cannot emit one.
fn interior_boundaries(
  mode: ChunkMode,
  total_frames: u64,
  fps: u32,
  chunk_size: u32,
  chunk_length: u32,
  keyframe_pts: &[f64],
) -> Vec<u64> {
  let mut boundaries: Vec<u64> = match mode {
    ChunkMode::None => Vec::new(),
    ChunkMode::FixedCount => {
      let n = u64::from(chunk_size);
      (1..n).map(|i| total_frames * i / n).collect()
    }
    ChunkMode::FixedLength => {
      // Integer seconds, matching the cut convention: a trailing partial
      // window is absorbed into the preceding chunk.
      let duration_secs = total_frames / u64::from(fps);
      let step_secs = u64::from(chunk_length);
      (1..)
        .map(|m| m * step_secs)
        .take_while(|secs| *secs < duration_secs)
        .map(|secs| secs * u64::from(fps))
        .collect()
    }
    ChunkMode::Keyframe => keyframe_pts
      .iter()
      .filter(|pts| **pts > 0.0)
      .map(|pts| (pts * f64::from(fps)) as u64)
      .collect(),
  };

  boundaries.retain(|frame| *frame > 0 && *frame < total_frames);
  boundaries.sort_unstable();
  boundaries.dedup();
  boundaries
}
