#[cfg(test)]
mod tests;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A contiguous frame range of the source, encoded and quality-checked as an
/// independent search unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
  /// Per-file scratch directory the chunk's artifacts live under.
  pub temp: PathBuf,
  /// 1-based index; dense across the whole file.
  pub index: u32,
  pub start_frame: u64,
  // End frame is exclusive, i.e. the range of frames is `start_frame..end_frame`
  pub end_frame: u64,
  pub output_ext: String,
}

impl Chunk {
  pub fn name(&self) -> String {
    format!("chunk{}", self.index)
  }

  /// The visually lossless reference cut used for VMAF comparisons.
  pub fn prepared_path(&self) -> PathBuf {
    self
      .temp
      .join("prepared")
      .join(format!("{}.{}", self.name(), self.output_ext))
  }

  /// The AV1 candidate produced by the current search attempt.
  pub fn converted_path(&self) -> PathBuf {
    self
      .temp
      .join("converted")
      .join(format!("{}.{}", self.name(), self.output_ext))
  }

  /// Per-chunk VMAF log; evaluations of different chunks never share one.
  pub fn vmaf_log_path(&self) -> PathBuf {
    self
      .temp
      .join("converted")
      .join(format!("{}.vmaf.json", self.name()))
  }

  pub const fn frames(&self) -> u64 {
    self.end_frame - self.start_frame
  }

  /// Cut-in point in seconds; the same convention feeds the materializer and
  /// the encoder so the reference and the candidate stay frame-aligned.
  pub fn start_secs(&self, fps: u32) -> f64 {
    self.start_frame as f64 / f64::from(fps)
  }

  /// Cut-out point in seconds, exclusive.
  pub fn end_secs(&self, fps: u32) -> f64 {
    self.end_frame as f64 / f64::from(fps)
  }
}
