#[cfg(test)]
mod tests;

use std::path::PathBuf;

use anyhow::{bail, ensure};
use once_cell::sync::Lazy;
use path_abs::PathAbs;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::util::args;
use crate::{vmaf, ChunkMode, VmafOffsetMode};

pub const CRF_MIN: i32 = 1;
pub const CRF_MAX: i32 = 63;

static BITRATE_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+[BbKkMm]?$").unwrap());

/// Process-scoped configuration, immutable after `validate` has passed.
///
/// Field order matters: the generated settings file is written in this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Directory scanned for input files.
  pub input_dir: PathBuf,
  /// Directory the finished files are written to.
  pub output_dir: PathBuf,
  /// Extension of the files to pick up; `*` matches any.
  pub input_ext: String,
  /// Container extension of the output files.
  pub output_ext: String,

  pub chunk_mode: ChunkMode,
  /// Number of chunks in `fixed-count` mode.
  pub chunk_size: u32,
  /// Chunk duration in seconds in `fixed-length` mode.
  pub chunk_length: u32,

  /// SVT-AV1 preset, 0 (slowest) to 12 (fastest).
  pub av1_preset: u8,
  pub pixel_format: String,
  /// SVT-AV1 tune: 0 = VQ (subjective), 1 = PSNR (objective).
  pub tune_mode: u8,
  /// Encoder keyframe interval in frames.
  pub keyframe_interval: u32,
  /// AAC bitrate for the muxed audio track, e.g. `192k`.
  pub audio_bitrate: String,
  /// Prefer the bitrate probed from the source over `audio_bitrate`.
  pub detect_audio_bitrate: bool,

  pub initial_crf: i32,
  pub initial_crf_step: u32,
  pub vmaf_min: f64,
  pub vmaf_max: f64,
  pub vmaf_offset_mode: VmafOffsetMode,
  pub vmaf_offset_threshold: u32,
  pub vmaf_offset_multiplier: f64,
  /// Encode attempts per search unit before giving up on it.
  pub max_attempts: u32,

  /// Files converted concurrently.
  pub file_workers: usize,
  /// Chunk pipeline workers per file.
  pub chunk_workers: usize,
  /// Threads handed to libvmaf; 0 picks half the logical cores.
  pub vmaf_threads: usize,

  /// Scratch directory; owned by this process for the duration of a run.
  pub tmp_dir: PathBuf,
  pub keep_tmp_files: bool,

  /// 0 = silence ffmpeg, 1 = progress stats only, 2 = full ffmpeg output.
  pub ffmpeg_verbosity: u8,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      input_dir: PathBuf::from("lossless"),
      output_dir: PathBuf::from("AV1"),
      input_ext: "mp4".into(),
      output_ext: "mp4".into(),
      chunk_mode: ChunkMode::FixedLength,
      chunk_size: 5,
      chunk_length: 10,
      av1_preset: 6,
      pixel_format: "yuv420p10le".into(),
      tune_mode: 0,
      keyframe_interval: 300,
      audio_bitrate: "192k".into(),
      detect_audio_bitrate: false,
      initial_crf: 44,
      initial_crf_step: 1,
      vmaf_min: 90.5,
      vmaf_max: 93.0,
      vmaf_offset_mode: VmafOffsetMode::Threshold,
      vmaf_offset_threshold: 2,
      vmaf_offset_multiplier: 1.3,
      max_attempts: 10,
      file_workers: 1,
      chunk_workers: 2,
      vmaf_threads: 0,
      tmp_dir: std::env::temp_dir().join("vmafconv"),
      keep_tmp_files: false,
      ffmpeg_verbosity: 0,
    }
  }
}

impl Settings {
  /// Refuses invalid values and invalid combinations before anything is
  /// spawned or written. Called exactly once, right after the settings file
  /// and command-line overrides have been merged.
  pub fn validate(&self) -> anyhow::Result<()> {
    ensure!(
      self.input_dir.is_dir(),
      "input directory {:?} does not exist",
      self.input_dir
    );
    ensure!(
      PathAbs::new(&self.input_dir)?.as_path() != PathAbs::new(&self.output_dir)?.as_path(),
      "input and output directory must differ"
    );
    ensure!(
      PathAbs::new(&self.tmp_dir)?.as_path() != PathAbs::new(&self.input_dir)?.as_path()
        && PathAbs::new(&self.tmp_dir)?.as_path() != PathAbs::new(&self.output_dir)?.as_path(),
      "the scratch directory must be outside the input and output directories"
    );
    ensure!(
      !self.output_ext.is_empty() && self.output_ext != "*",
      "output extension must name a concrete container"
    );

    ensure!(self.av1_preset <= 12, "av1_preset must be within 0-12");
    ensure!(self.tune_mode <= 1, "tune_mode must be 0 or 1");
    ensure!(self.keyframe_interval >= 1, "keyframe_interval must be >= 1");
    ensure!(self.chunk_size >= 1, "chunk_size must be >= 1");
    ensure!(self.chunk_length >= 1, "chunk_length must be >= 1");

    ensure!(
      (CRF_MIN..=CRF_MAX).contains(&self.initial_crf),
      "initial_crf must be within {}-{}",
      CRF_MIN,
      CRF_MAX
    );
    ensure!(self.initial_crf_step >= 1, "initial_crf_step must be >= 1");
    ensure!(
      (0.0..=100.0).contains(&self.vmaf_min) && (0.0..=100.0).contains(&self.vmaf_max),
      "VMAF bounds must be within 0-100"
    );
    ensure!(
      self.vmaf_min <= self.vmaf_max,
      "vmaf_min ({}) must not exceed vmaf_max ({})",
      self.vmaf_min,
      self.vmaf_max
    );
    ensure!(
      self.vmaf_offset_threshold >= 1,
      "vmaf_offset_threshold must be >= 1"
    );
    ensure!(
      self.vmaf_offset_multiplier > 0.0,
      "vmaf_offset_multiplier must be > 0"
    );
    ensure!(self.max_attempts >= 1, "max_attempts must be >= 1");

    ensure!(self.file_workers >= 1, "file_workers must be >= 1");
    ensure!(self.chunk_workers >= 1, "chunk_workers must be >= 1");
    ensure!(self.ffmpeg_verbosity <= 2, "ffmpeg_verbosity must be 0-2");

    if !BITRATE_SHAPE.is_match(&self.audio_bitrate) {
      bail!(
        "audio_bitrate {:?} is not a bitrate (expected e.g. 192k)",
        self.audio_bitrate
      );
    }

    Ok(())
  }

  /// Checks the external tooling contract: ffmpeg and ffprobe on PATH, and
  /// an ffmpeg built with libvmaf.
  pub fn startup_check(&self) -> anyhow::Result<()> {
    if which::which("ffmpeg").is_err() {
      bail!("FFmpeg not found. Is it installed in the system path?");
    }
    if which::which("ffprobe").is_err() {
      bail!("ffprobe not found. Is it installed in the system path?");
    }
    vmaf::validate_libvmaf()?;
    Ok(())
  }

  /// Leading ffmpeg arguments implementing the `ffmpeg_verbosity` contract.
  pub fn ffmpeg_verbosity_args(&self) -> Vec<String> {
    match self.ffmpeg_verbosity {
      0 => args!["-hide_banner", "-loglevel", "error"],
      1 => args!["-hide_banner", "-loglevel", "error", "-stats"],
      _ => args!["-hide_banner"],
    }
  }

  /// Thread count handed to libvmaf; defaults to half the logical cores.
  pub fn vmaf_thread_count(&self) -> usize {
    if self.vmaf_threads == 0 {
      std::cmp::max(num_cpus::get() / 2, 1)
    } else {
      self.vmaf_threads
    }
  }
}
