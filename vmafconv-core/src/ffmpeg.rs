use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::Context;
use path_abs::PathAbs;

use crate::broker::ProcessError;
use crate::chunk::Chunk;
use crate::context::RunContext;
use crate::settings::Settings;
use crate::util::args;

/// Renders an argv the way a shell would accept it, so a failed invocation
/// can be reproduced by pasting the logged line.
pub fn pretty_cmd(cmd: &[OsString]) -> String {
  cmd
    .iter()
    .map(|arg| {
      let arg = arg.to_string_lossy();
      if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'') {
        format!("'{}'", arg.replace('\'', r"'\''"))
      } else {
        arg.into_owned()
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// Runs an external command to completion under supervision: the child is
/// registered with the context so a user interrupt can reach it, and its
/// stderr is captured for the error report when the configured verbosity
/// keeps ffmpeg silent.
pub fn run_command(ctx: &RunContext, cmd: &[OsString], verbosity: u8) -> anyhow::Result<()> {
  let mut command = if let [program, args @ ..] = cmd {
    let mut command = Command::new(program);
    command.args(args);
    command
  } else {
    unreachable!()
  };
  command.stdin(Stdio::null());
  command.stdout(Stdio::null());
  command.stderr(if verbosity == 0 {
    Stdio::piped()
  } else {
    Stdio::inherit()
  });

  let mut child = command
    .spawn()
    .with_context(|| format!("failed to spawn: {}", pretty_cmd(cmd)))?;
  let stderr_pipe = child.stderr.take();
  let (id, child) = ctx.adopt_child(child);

  // Draining the pipe keeps the child from stalling on a full buffer; it
  // ends when the child closes stderr on exit.
  let mut stderr = Vec::new();
  if let Some(mut pipe) = stderr_pipe {
    let _ = pipe.read_to_end(&mut stderr);
  }

  let status = ctx
    .wait_child(&child)
    .with_context(|| format!("failed to wait on: {}", pretty_cmd(cmd)))?;
  ctx.release_child(id);

  if !status.success() {
    return Err(ProcessError::new(status, stderr, pretty_cmd(cmd)).into());
  }

  Ok(())
}

/// Cuts the chunk's frame window out of the source as a visually lossless
/// H.264 intermediate, the VMAF reference for that chunk.
pub fn lossless_cut_cmd(settings: &Settings, source: &Path, chunk: &Chunk, fps: u32) -> Vec<OsString> {
  let mut cmd: Vec<OsString> = args!["ffmpeg", "-nostdin"];
  cmd.extend(settings.ffmpeg_verbosity_args().into_iter().map(OsString::from));
  cmd.extend::<Vec<OsString>>(args![
    "-ss",
    chunk.start_secs(fps).to_string(),
    "-to",
    chunk.end_secs(fps).to_string(),
    "-i",
    source,
    "-c:v",
    "libx264",
    "-preset",
    "ultrafast",
    "-qp",
    "0",
    "-an",
    chunk.prepared_path(),
  ]);
  cmd
}

/// Encodes the chunk's frame window with SVT-AV1 at the given CRF.
pub fn encode_chunk_cmd(
  settings: &Settings,
  source: &Path,
  chunk: &Chunk,
  fps: u32,
  crf: i32,
) -> Vec<OsString> {
  let mut cmd: Vec<OsString> = args!["ffmpeg", "-nostdin"];
  cmd.extend(settings.ffmpeg_verbosity_args().into_iter().map(OsString::from));
  cmd.extend::<Vec<OsString>>(args![
    "-ss",
    chunk.start_secs(fps).to_string(),
    "-to",
    chunk.end_secs(fps).to_string(),
    "-i",
    source,
    "-c:v",
    "libsvtav1",
    "-crf",
    crf.to_string(),
    "-b:v",
    "0",
    "-an",
    "-g",
    settings.keyframe_interval.to_string(),
    "-preset",
    settings.av1_preset.to_string(),
    "-pix_fmt",
    settings.pixel_format.clone(),
    "-svtav1-params",
    format!("tune={}", settings.tune_mode),
    chunk.converted_path(),
  ]);
  cmd
}

/// Whole-file encode for the unchunked mode: audio is transcoded in the same
/// pass and the result lands directly at the output path.
pub fn encode_full_cmd(
  settings: &Settings,
  source: &Path,
  crf: i32,
  audio_bitrate: &str,
  output: &Path,
) -> Vec<OsString> {
  let mut cmd: Vec<OsString> = args!["ffmpeg", "-nostdin"];
  cmd.extend(settings.ffmpeg_verbosity_args().into_iter().map(OsString::from));
  cmd.extend::<Vec<OsString>>(args![
    "-i",
    source,
    "-c:a",
    "aac",
    "-c:v",
    "libsvtav1",
    "-crf",
    crf.to_string(),
    "-b:v",
    "0",
    "-b:a",
    audio_bitrate,
    "-g",
    settings.keyframe_interval.to_string(),
    "-preset",
    settings.av1_preset.to_string(),
    "-pix_fmt",
    settings.pixel_format.clone(),
    "-svtav1-params",
    format!("tune={}", settings.tune_mode),
    "-movflags",
    "+faststart",
    output,
  ]);
  cmd
}

/// Stream-copies the first audio track into the scratch directory.
pub fn extract_audio_cmd(settings: &Settings, source: &Path, dest: &Path) -> Vec<OsString> {
  let mut cmd: Vec<OsString> = args!["ffmpeg", "-nostdin"];
  cmd.extend(settings.ffmpeg_verbosity_args().into_iter().map(OsString::from));
  cmd.extend::<Vec<OsString>>(args!["-i", source, "-vn", "-c:a", "copy", dest]);
  cmd
}

/// Escapes paths in ffmpeg filters if on windows
pub fn escape_path_in_filter(path: impl AsRef<Path>) -> anyhow::Result<String> {
  let path = PathAbs::new(path.as_ref())?;
  let path = path
    .as_path()
    .to_str()
    .context("filter path is not valid UTF-8")?;

  if cfg!(target_os = "windows") {
    // This is needed because of how FFmpeg handles absolute file paths on Windows.
    // https://stackoverflow.com/questions/60440793/how-can-i-use-windows-absolute-paths-with-the-movie-filter-on-ffmpeg
    Ok(path.replace('\\', "/").replace(':', r"\\:"))
  } else {
    Ok(path.to_string())
  }
}
