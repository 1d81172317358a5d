#[macro_use]
extern crate log;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub mod broker;
pub mod chunk;
pub mod concat;
pub mod context;
pub mod dispatch;
pub mod ffmpeg;
pub mod probe;
pub mod progress_bar;
pub mod settings;
pub mod split;
pub mod target_quality;
pub mod temp;
mod util;
pub mod vmaf;

/// How an input file is partitioned into independent search units.
#[derive(
  PartialEq, Eq, Copy, Clone, Serialize, Deserialize, Debug, strum::EnumString, strum::IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkMode {
  /// The whole file is a single search unit.
  #[strum(serialize = "none")]
  None,
  /// Split into exactly `chunk_size` equally sized chunks.
  #[strum(serialize = "fixed-count")]
  FixedCount,
  /// Split into chunks of `chunk_length` seconds each.
  #[strum(serialize = "fixed-length")]
  FixedLength,
  /// Split at the source's own keyframes.
  #[strum(serialize = "keyframe")]
  Keyframe,
}

impl Display for ChunkMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(<&'static str>::from(self))
  }
}

/// Policy used by the CRF controller to grow the step size when the measured
/// VMAF is outside the window.
#[derive(
  PartialEq, Eq, Copy, Clone, Serialize, Deserialize, Debug, strum::EnumString, strum::IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
pub enum VmafOffsetMode {
  /// Conservative: one extra CRF unit per `vmaf_offset_threshold` percent of
  /// deviation. Forced over to `Multiplier` when the deviation reaches 5.
  #[strum(serialize = "threshold")]
  Threshold,
  /// Aggressive: the deviation times `vmaf_offset_multiplier` extra CRF
  /// units. Can overshoot.
  #[strum(serialize = "multiplier")]
  Multiplier,
}

impl Display for VmafOffsetMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(<&'static str>::from(self))
  }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Verbosity {
  Quiet,
  Normal,
  Verbose,
}
