#[cfg(test)]
mod tests;

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{bail, ensure, Context};
use serde::Deserialize;

use crate::context::RunContext;
use crate::ffmpeg;
use crate::util::args;
use crate::settings::Settings;

#[derive(Deserialize, Debug)]
struct VmafLog {
  pooled_metrics: PooledMetrics,
}

#[derive(Deserialize, Debug)]
struct PooledMetrics {
  vmaf: VmafPool,
}

#[derive(Deserialize, Debug)]
struct VmafPool {
  harmonic_mean: f64,
}

/// Refuses to start against an ffmpeg built without libvmaf; every search
/// would fail at its first scoring step otherwise.
pub fn validate_libvmaf() -> anyhow::Result<()> {
  let out = Command::new("ffmpeg")
    .arg("-h")
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .context("failed to run ffmpeg to inspect its build configuration")?;

  // The configuration banner goes to stderr on most builds, but not all.
  let banner = [out.stderr.as_slice(), out.stdout.as_slice()].concat();
  if !String::from_utf8_lossy(&banner).contains("--enable-libvmaf") {
    bail!("this ffmpeg build lacks --enable-libvmaf, which the quality search requires");
  }
  Ok(())
}

/// Scores `candidate` against `reference` and returns the pooled harmonic
/// mean. `log_path` must be unique per evaluation; concurrent workers each
/// write their own log.
pub fn evaluate(
  ctx: &RunContext,
  settings: &Settings,
  reference: &Path,
  candidate: &Path,
  log_path: &Path,
) -> anyhow::Result<f64> {
  let filter = format!(
    "libvmaf=log_path={}:log_fmt=json:n_threads={}",
    ffmpeg::escape_path_in_filter(log_path)?,
    settings.vmaf_thread_count()
  );

  let mut cmd: Vec<OsString> = args!["ffmpeg", "-nostdin"];
  cmd.extend(settings.ffmpeg_verbosity_args().into_iter().map(OsString::from));
  cmd.extend::<Vec<OsString>>(args![
    "-i",
    candidate,
    "-i",
    reference,
    "-lavfi",
    filter,
    "-f",
    "null",
    "-",
  ]);

  ffmpeg::run_command(ctx, &cmd, settings.ffmpeg_verbosity)
    .with_context(|| format!("VMAF comparison of {:?} failed", candidate))?;

  let raw = std::fs::read_to_string(log_path)
    .with_context(|| format!("libvmaf wrote no log at {:?}", log_path))?;
  let score = read_harmonic_mean(&raw)?;
  ensure!(
    (0.0..=100.0).contains(&score),
    "libvmaf reported an impossible score: {}",
    score
  );
  Ok(score)
}

/// Pulls `pooled_metrics.vmaf.harmonic_mean` out of a libvmaf JSON log.
pub fn read_harmonic_mean(json: &str) -> anyhow::Result<f64> {
  let log: VmafLog = serde_json::from_str(json).context("unparseable libvmaf log")?;
  Ok(log.pooled_metrics.vmaf.harmonic_mean)
}
