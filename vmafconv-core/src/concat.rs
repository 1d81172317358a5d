
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context};

use crate::context::RunContext;
use crate::ffmpeg;
use crate::util::args;
use crate::settings::Settings;

/// Formats the ffmpeg concat demuxer list for the accepted chunks.
/// Refuses a sparse set: every index `1..=N` must be present.
pub fn concat_list(accepted: &BTreeMap<u32, PathBuf>) -> anyhow::Result<String> {
  let mut contents = String::with_capacity(24 * accepted.len());

  for (expected, (index, path)) in (1u32..).zip(accepted.iter()) {
    if *index != expected {
      bail!("chunk {} is missing from the accepted set", expected);
    }
    contents.push_str(&format!("file {}\n", escape_concat_path(path)));
  }

  Ok(contents)
}

fn escape_concat_path(path: &Path) -> String {
  format!("{}", path.display())
    .replace('\\', r"\\")
    .replace(' ', r"\ ")
    .replace('\'', r"\'")
}

/// Assembles the accepted chunks in index order and muxes the extracted
/// audio in, re-encoded to AAC at the effective bitrate. Must only run once
/// the accepted queue is closed and audio extraction has finished or been
/// proven absent.
pub fn concatenate(
  ctx: &RunContext,
  settings: &Settings,
  temp: &Path,
  accepted: &BTreeMap<u32, PathBuf>,
  audio: Option<(&Path, &str)>,
  output: &Path,
) -> anyhow::Result<()> {
  let list = concat_list(accepted)?;
  let list_path = temp.join("concatlist.txt");

  let mut file = File::create(&list_path)
    .with_context(|| format!("failed to create concat list {:?}", list_path))?;
  file
    .write_all(list.as_bytes())
    .with_context(|| format!("failed to write concat list {:?}", list_path))?;

  let mut cmd: Vec<OsString> = args!["ffmpeg", "-nostdin"];
  cmd.extend(settings.ffmpeg_verbosity_args().into_iter().map(OsString::from));
  cmd.extend::<Vec<OsString>>(args![
    "-safe",
    "0",
    "-f",
    "concat",
    "-i",
    list_path.clone(),
  ]);
  match audio {
    Some((audio_path, bitrate)) => {
      cmd.extend::<Vec<OsString>>(args![
        "-i", audio_path, "-map", "0:v", "-map", "1:a", "-c:v", "copy", "-c:a", "aac", "-b:a",
        bitrate,
      ]);
    }
    None => {
      cmd.extend::<Vec<OsString>>(args!["-c:v", "copy", "-an"]);
    }
  }
  cmd.extend::<Vec<OsString>>(args!["-movflags", "+faststart", output]);

  debug!("concat command: {}", ffmpeg::pretty_cmd(&cmd));
  ffmpeg::run_command(ctx, &cmd, settings.ffmpeg_verbosity).context("concatenation failed")?;

  ensure!(
    output.exists(),
    "concatenation reported success but produced no output at {:?}",
    output
  );
  Ok(())
}
