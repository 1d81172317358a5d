#[cfg(test)]
mod tests;

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;

/// Per-file video facts the planner and the cut math depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMeta {
  pub total_frames: u64,
  pub fps: u32,
  pub codec_name: String,
}

/// Audio facts; a file without audio is perfectly valid.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioMeta {
  pub present: bool,
  pub codec_name: Option<String>,
  pub bitrate: Option<u64>,
}

#[derive(Deserialize)]
struct StreamList {
  #[serde(default)]
  streams: Vec<Stream>,
}

#[derive(Deserialize)]
struct Stream {
  codec_name: Option<String>,
  nb_frames: Option<String>,
  avg_frame_rate: Option<String>,
  bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct PacketList {
  #[serde(default)]
  packets: Vec<Packet>,
}

#[derive(Deserialize)]
struct Packet {
  pts_time: Option<String>,
  #[serde(default)]
  flags: String,
}

/// Probes the first video stream. A missing stream, an unreadable frame
/// count, or an unparseable frame rate is fatal for the file; nothing here
/// falls back silently.
pub fn video_meta(source: &Path) -> anyhow::Result<VideoMeta> {
  let json = ffprobe_streams(source, "v:0")?;
  parse_video_meta(&json).with_context(|| format!("probing video stream of {:?}", source))
}

/// Probes the first audio stream; absence is not an error.
pub fn audio_meta(source: &Path) -> anyhow::Result<AudioMeta> {
  let json = ffprobe_streams(source, "a:0")?;
  Ok(parse_audio_meta(&json))
}

/// `pts_time` of every keyframe-flagged packet of the first video stream,
/// in presentation order.
pub fn keyframe_pts(source: &Path) -> anyhow::Result<Vec<f64>> {
  let mut cmd = Command::new("ffprobe");
  cmd.args([
    "-v",
    "quiet",
    "-select_streams",
    "v:0",
    "-show_entries",
    "packet=pts_time,flags",
    "-of",
    "json",
  ]);
  cmd.arg(source);
  cmd.stdout(Stdio::piped());
  cmd.stderr(Stdio::null());

  let out = cmd
    .output()
    .with_context(|| format!("failed to run ffprobe on {:?}", source))?;
  if !out.status.success() {
    bail!("ffprobe could not read packets from {:?}", source);
  }

  let json = String::from_utf8(out.stdout).context("ffprobe emitted non-UTF-8 JSON")?;
  parse_keyframe_pts(&json).with_context(|| format!("reading keyframes of {:?}", source))
}

fn ffprobe_streams(source: &Path, selector: &str) -> anyhow::Result<String> {
  let mut cmd = Command::new("ffprobe");
  cmd.args([
    "-v",
    "quiet",
    "-show_streams",
    "-select_streams",
    selector,
    "-of",
    "json",
  ]);
  cmd.arg(source);
  cmd.stdout(Stdio::piped());
  cmd.stderr(Stdio::null());

  let out = cmd
    .output()
    .with_context(|| format!("failed to run ffprobe on {:?}", source))?;
  if !out.status.success() {
    bail!("ffprobe failed on {:?}", source);
  }

  String::from_utf8(out.stdout).context("ffprobe emitted non-UTF-8 JSON")
}

fn parse_video_meta(json: &str) -> anyhow::Result<VideoMeta> {
  let list: StreamList = serde_json::from_str(json).context("unparseable ffprobe output")?;
  let stream = list
    .streams
    .into_iter()
    .next()
    .ok_or_else(|| anyhow!("no video stream detected"))?;

  let total_frames: u64 = stream
    .nb_frames
    .as_deref()
    .ok_or_else(|| anyhow!("the video stream does not report a frame count"))?
    .parse()
    .context("the reported frame count is not a number")?;

  let fps = stream
    .avg_frame_rate
    .as_deref()
    .and_then(parse_frame_rate)
    .ok_or_else(|| anyhow!("could not parse the stream's average frame rate"))?;

  Ok(VideoMeta {
    total_frames,
    fps,
    codec_name: stream.codec_name.unwrap_or_default(),
  })
}

fn parse_audio_meta(json: &str) -> AudioMeta {
  let list: StreamList = match serde_json::from_str(json) {
    Ok(list) => list,
    Err(_) => StreamList { streams: Vec::new() },
  };

  match list.streams.into_iter().next() {
    Some(stream) => AudioMeta {
      present: true,
      bitrate: stream.bit_rate.as_deref().and_then(|b| b.parse().ok()),
      codec_name: stream.codec_name,
    },
    None => AudioMeta::default(),
  }
}

/// Parses ffprobe's `num/den` rational into a rounded integer rate.
fn parse_frame_rate(rate: &str) -> Option<u32> {
  let (num, den) = rate.split_once('/')?;
  let num: u64 = num.parse().ok()?;
  let den: u64 = den.parse().ok()?;
  if den == 0 {
    return None;
  }
  let fps = (num + den / 2) / den;
  u32::try_from(fps).ok().filter(|fps| *fps > 0)
}

fn parse_keyframe_pts(json: &str) -> anyhow::Result<Vec<f64>> {
  let list: PacketList = serde_json::from_str(json).context("unparseable ffprobe packet output")?;
  Ok(
    list
      .packets
      .into_iter()
      .filter(|packet| packet.flags.contains('K'))
      .filter_map(|packet| packet.pts_time.as_deref().and_then(|pts| pts.parse().ok()))
      .collect(),
  )
}
