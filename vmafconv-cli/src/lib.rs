use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{AppSettings, Parser};
use flexi_logger::{
  colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger, LoggerHandle,
};
use once_cell::sync::OnceCell;

use vmafconv_core::settings::Settings;
use vmafconv_core::{ChunkMode, VmafOffsetMode};

// The handle flushes buffered log lines on drop; park it for the process
// lifetime.
static LOGGER_HANDLE: OnceCell<LoggerHandle> = OnceCell::new();

fn yes_no(value: &str) -> Result<bool, String> {
  match value {
    "yes" | "y" | "true" | "1" => Ok(true),
    "no" | "n" | "false" | "0" => Ok(false),
    other => Err(format!("expected yes/no, got {:?}", other)),
  }
}

/// Batch AV1 converter which re-encodes every file until its VMAF score
/// lands inside the configured quality window
#[derive(Parser, Debug)]
#[clap(name = "vmafconv", version, setting = AppSettings::DeriveDisplayOrder)]
pub struct CliOpts {
  /// Settings file; written with defaults on first run
  #[clap(long, default_value = "vmafconv.toml", parse(from_os_str))]
  pub settings_file: PathBuf,

  /// Directory holding the files to convert
  #[clap(short, long, parse(from_os_str), help_heading = "INPUT/OUTPUT")]
  pub input: Option<PathBuf>,

  /// Directory the converted files are written to
  #[clap(short, long, parse(from_os_str), help_heading = "INPUT/OUTPUT")]
  pub output: Option<PathBuf>,

  /// Container extension to convert from; use * for any
  #[clap(long, help_heading = "INPUT/OUTPUT")]
  pub input_ext: Option<String>,

  /// Container extension to convert to
  #[clap(long, help_heading = "INPUT/OUTPUT")]
  pub output_ext: Option<String>,

  /// How to split each file into independently searched chunks
  #[clap(long, possible_values = &["none", "fixed-count", "fixed-length", "keyframe"], help_heading = "CHUNKING")]
  pub chunk_mode: Option<ChunkMode>,

  /// Number of chunks in fixed-count mode
  #[clap(long, help_heading = "CHUNKING")]
  pub chunk_size: Option<u32>,

  /// Chunk duration in seconds in fixed-length mode
  #[clap(long, help_heading = "CHUNKING")]
  pub chunk_length: Option<u32>,

  /// SVT-AV1 preset, 0 (slowest) to 12 (fastest)
  #[clap(long, help_heading = "ENCODER")]
  pub av1_preset: Option<u8>,

  /// Encoder pixel format, e.g. yuv420p for 8-bit or yuv420p10le for 10-bit
  #[clap(long, help_heading = "ENCODER")]
  pub pixel_format: Option<String>,

  /// SVT-AV1 tune: 0 = VQ (subjective), 1 = PSNR (objective)
  #[clap(long, help_heading = "ENCODER")]
  pub tune_mode: Option<u8>,

  /// Encoder keyframe interval in frames
  #[clap(short = 'g', long, help_heading = "ENCODER")]
  pub keyframe_interval: Option<u32>,

  /// AAC bitrate for the muxed audio, e.g. 192k
  #[clap(long, help_heading = "ENCODER")]
  pub audio_bitrate: Option<String>,

  /// Use the bitrate probed from the source instead of audio_bitrate
  #[clap(long, value_name = "yes|no", parse(try_from_str = yes_no), help_heading = "ENCODER")]
  pub detect_audio_bitrate: Option<bool>,

  /// CRF value the search starts from
  #[clap(long, help_heading = "QUALITY SEARCH")]
  pub initial_crf: Option<i32>,

  /// Base CRF adjustment per retry
  #[clap(long, help_heading = "QUALITY SEARCH")]
  pub initial_crf_step: Option<u32>,

  /// Lowest acceptable VMAF score
  #[clap(long, help_heading = "QUALITY SEARCH")]
  pub vmaf_min: Option<f64>,

  /// Highest acceptable VMAF score
  #[clap(long, help_heading = "QUALITY SEARCH")]
  pub vmaf_max: Option<f64>,

  /// Step growth policy when the score misses the window
  #[clap(long, possible_values = &["threshold", "multiplier"], help_heading = "QUALITY SEARCH")]
  pub vmaf_offset_mode: Option<VmafOffsetMode>,

  /// Whole points of deviation per extra CRF step in threshold mode
  #[clap(long, help_heading = "QUALITY SEARCH")]
  pub vmaf_offset_threshold: Option<u32>,

  /// Deviation multiplier in multiplier mode
  #[clap(long, help_heading = "QUALITY SEARCH")]
  pub vmaf_offset_multiplier: Option<f64>,

  /// Encode attempts per search unit before giving up on it
  #[clap(long, help_heading = "QUALITY SEARCH")]
  pub max_attempts: Option<u32>,

  /// Files converted concurrently
  #[clap(long, help_heading = "WORKERS")]
  pub file_workers: Option<usize>,

  /// Chunk pipeline workers per file
  #[clap(short = 'w', long, help_heading = "WORKERS")]
  pub chunk_workers: Option<usize>,

  /// Threads handed to libvmaf; 0 picks half the logical cores
  #[clap(long, help_heading = "WORKERS")]
  pub vmaf_threads: Option<usize>,

  /// Scratch directory; wiped on exit unless --keep-tmp-files yes
  #[clap(long, parse(from_os_str), help_heading = "SCRATCH")]
  pub tmp_dir: Option<PathBuf>,

  /// Keep the scratch directory after the run
  #[clap(short = 'k', long, value_name = "yes|no", parse(try_from_str = yes_no), help_heading = "SCRATCH")]
  pub keep_tmp_files: Option<bool>,

  /// ffmpeg chatter: 0 = hidden, 1 = stats, 2 = full
  #[clap(long, help_heading = "SCRATCH")]
  pub ffmpeg_verbosity: Option<u8>,

  /// Disable printing progress to the terminal
  #[clap(short, long, conflicts_with = "verbose")]
  pub quiet: bool,

  /// Print extra progress info and stats to the terminal
  #[clap(long)]
  pub verbose: bool,

  /// Log file location [default: <tmp dir>/vmafconv.log]
  #[clap(short, long, parse(from_os_str))]
  pub log_file: Option<PathBuf>,

  /// Set log level for the log file and terminal
  #[clap(long, default_value = "info", possible_values = &["error", "warn", "info", "debug", "trace"], ignore_case = true)]
  pub log_level: log::LevelFilter,
}

/// Loads the settings file, writing one with defaults first if it does not
/// exist yet.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
  if !path.exists() {
    let defaults = Settings::default();
    let serialized =
      toml::to_string_pretty(&defaults).context("failed to serialize default settings")?;
    std::fs::write(path, serialized)
      .with_context(|| format!("failed to write settings file {:?}", path))?;
    println!(
      "Created {} with default settings; review it or override values with flags.",
      path.display()
    );
    return Ok(defaults);
  }

  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read settings file {:?}", path))?;
  toml::from_str(&raw).with_context(|| format!("invalid settings file {:?}", path))
}

/// Command-line flags win over the settings file.
pub fn apply_overrides(settings: &mut Settings, opts: &CliOpts) {
  if let Some(value) = opts.input.clone() {
    settings.input_dir = value;
  }
  if let Some(value) = opts.output.clone() {
    settings.output_dir = value;
  }
  if let Some(value) = opts.input_ext.clone() {
    settings.input_ext = value;
  }
  if let Some(value) = opts.output_ext.clone() {
    settings.output_ext = value;
  }
  if let Some(value) = opts.chunk_mode {
    settings.chunk_mode = value;
  }
  if let Some(value) = opts.chunk_size {
    settings.chunk_size = value;
  }
  if let Some(value) = opts.chunk_length {
    settings.chunk_length = value;
  }
  if let Some(value) = opts.av1_preset {
    settings.av1_preset = value;
  }
  if let Some(value) = opts.pixel_format.clone() {
    settings.pixel_format = value;
  }
  if let Some(value) = opts.tune_mode {
    settings.tune_mode = value;
  }
  if let Some(value) = opts.keyframe_interval {
    settings.keyframe_interval = value;
  }
  if let Some(value) = opts.audio_bitrate.clone() {
    settings.audio_bitrate = value;
  }
  if let Some(value) = opts.detect_audio_bitrate {
    settings.detect_audio_bitrate = value;
  }
  if let Some(value) = opts.initial_crf {
    settings.initial_crf = value;
  }
  if let Some(value) = opts.initial_crf_step {
    settings.initial_crf_step = value;
  }
  if let Some(value) = opts.vmaf_min {
    settings.vmaf_min = value;
  }
  if let Some(value) = opts.vmaf_max {
    settings.vmaf_max = value;
  }
  if let Some(value) = opts.vmaf_offset_mode {
    settings.vmaf_offset_mode = value;
  }
  if let Some(value) = opts.vmaf_offset_threshold {
    settings.vmaf_offset_threshold = value;
  }
  if let Some(value) = opts.vmaf_offset_multiplier {
    settings.vmaf_offset_multiplier = value;
  }
  if let Some(value) = opts.max_attempts {
    settings.max_attempts = value;
  }
  if let Some(value) = opts.file_workers {
    settings.file_workers = value;
  }
  if let Some(value) = opts.chunk_workers {
    settings.chunk_workers = value;
  }
  if let Some(value) = opts.vmaf_threads {
    settings.vmaf_threads = value;
  }
  if let Some(value) = opts.tmp_dir.clone() {
    settings.tmp_dir = value;
  }
  if let Some(value) = opts.keep_tmp_files {
    settings.keep_tmp_files = value;
  }
  if let Some(value) = opts.ffmpeg_verbosity {
    settings.ffmpeg_verbosity = value;
  }
}

/// File logging plus a colored stderr duplicate, scaled by --quiet/--verbose.
pub fn init_logging(opts: &CliOpts, settings: &Settings) -> anyhow::Result<()> {
  let file_spec = match &opts.log_file {
    Some(path) => FileSpec::try_from(path.clone()).context("invalid log file location")?,
    None => FileSpec::default()
      .directory(&settings.tmp_dir)
      .basename("vmafconv")
      .suppress_timestamp(),
  };

  let duplicate = if opts.quiet {
    Duplicate::Error
  } else if opts.verbose {
    Duplicate::All
  } else {
    Duplicate::Info
  };

  let handle = Logger::try_with_str(opts.log_level.to_string().to_lowercase())
    .context("invalid log level")?
    .log_to_file(file_spec)
    .duplicate_to_stderr(duplicate)
    .format_for_files(detailed_format)
    .format_for_stderr(if atty::is(atty::Stream::Stderr) {
      colored_detailed_format
    } else {
      detailed_format
    })
    .start()
    .context("failed to initialize logging")?;

  let _ = LOGGER_HANDLE.set(handle);
  Ok(())
}
