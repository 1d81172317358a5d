use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::{bail, ensure, Context};
use crossbeam_channel::{bounded, Receiver, Sender};
use thiserror::Error;

use crate::chunk::Chunk;
use crate::concat;
use crate::context::RunContext;
use crate::ffmpeg;
use crate::probe::{self, AudioMeta, VideoMeta};
use crate::progress_bar::{finish_progress_bar, inc_bar, init_progress_bar, update_bar_msg};
use crate::settings::{Settings, CRF_MAX, CRF_MIN};
use crate::split;
use crate::target_quality::{self, Decision, SearchState};
use crate::temp;
use crate::vmaf;
use crate::{ChunkMode, Verbosity};

/// A supervised external command exited non-zero. Carries the verbatim
/// command line so the failure can be reproduced from the log, plus
/// whatever the child wrote to stderr.
#[derive(Error, Debug)]
pub struct ProcessError {
  exit_status: ExitStatus,
  stderr: String,
  cmd: String,
}

impl ProcessError {
  pub fn new(exit_status: ExitStatus, stderr: Vec<u8>, cmd: String) -> Self {
    let stderr = match simdutf8::basic::from_utf8(&stderr) {
      // SAFETY: validated as UTF-8 just above
      Ok(_) => unsafe { String::from_utf8_unchecked(stderr) },
      Err(_) => format!("(not UTF-8) {:?}", stderr),
    };
    Self {
      exit_status,
      stderr,
      cmd,
    }
  }
}

impl Display for ProcessError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "command exited with {}: {}\nstderr:\n{}",
      self.exit_status,
      self.cmd,
      textwrap::indent(&self.stderr, /* 8 spaces */ "        ")
    )?;
    Ok(())
  }
}

/// One slot of a stage queue: a unit of work, or the end-of-stream marker.
/// Producers enqueue exactly one `Done` per downstream consumer.
pub enum Message<T> {
  Item(T),
  Done,
}

/// Drives the whole pipeline for one input file: probe, plan, materialize,
/// search, extract audio, concatenate. Failure of any stage raises the
/// file-scoped flag and drains the others.
pub struct Broker<'a> {
  pub settings: &'a Settings,
  pub ctx: RunContext,
  pub source: &'a Path,
  /// Per-file scratch directory.
  pub temp: PathBuf,
  pub output_file: PathBuf,
  pub verbosity: Verbosity,
}

impl<'a> Broker<'a> {
  pub fn encode_file(&self) -> anyhow::Result<()> {
    let video = probe::video_meta(self.source)?;
    let audio = probe::audio_meta(self.source)?;

    debug!(
      "{}: {} frames at {} fps ({}), audio: {}",
      self.stem(),
      video.total_frames,
      video.fps,
      video.codec_name,
      audio.codec_name.as_deref().unwrap_or("none"),
    );

    match self.settings.chunk_mode {
      ChunkMode::None => self.convert_whole_file(&audio),
      _ => self.convert_chunked(&video, &audio),
    }
  }

  /// Unchunked mode: the search runs over the entire file, scored against
  /// the source itself, and encodes land directly at the output path.
  fn convert_whole_file(&self, audio: &AudioMeta) -> anyhow::Result<()> {
    temp::prepare_scratch(&self.temp)?;
    let log_path = self.temp.join("vmaf.json");
    let bitrate = self.effective_audio_bitrate(audio);
    let mut state = SearchState::initial(self.settings);

    loop {
      if self.ctx.failed() {
        bail!("conversion of {:?} cancelled", self.source);
      }

      info!(
        "{}: encoding at CRF {} (attempt {}/{})",
        self.stem(),
        state.crf,
        state.attempt + 1,
        self.settings.max_attempts
      );
      let cmd = ffmpeg::encode_full_cmd(
        self.settings,
        self.source,
        state.crf,
        &bitrate,
        &self.output_file,
      );
      debug!("{}", ffmpeg::pretty_cmd(&cmd));
      if let Err(e) = ffmpeg::run_command(&self.ctx, &cmd, self.settings.ffmpeg_verbosity) {
        // A partial file at the output path would mark this input as
        // converted on the next run.
        let _ = fs::remove_file(&self.output_file);
        return Err(e).with_context(|| format!("failed to encode {:?}", self.source));
      }

      let score = match vmaf::evaluate(
        &self.ctx,
        self.settings,
        self.source,
        &self.output_file,
        &log_path,
      ) {
        Ok(score) => score,
        Err(e) => {
          let _ = fs::remove_file(&self.output_file);
          return Err(e).with_context(|| format!("VMAF check failed on {:?}", self.source));
        }
      };

      match target_quality::evaluate(state, score, self.settings) {
        Decision::Accept => {
          info!(
            "{}: VMAF {:.2} inside {}-{} at CRF {} after {} attempt(s)",
            self.stem(),
            score,
            self.settings.vmaf_min,
            self.settings.vmaf_max,
            state.crf,
            state.attempt + 1
          );
          return Ok(());
        }
        Decision::Skip => {
          warn!(
            "{}: next CRF would leave {}-{}; keeping the result with VMAF {:.2}",
            self.stem(),
            CRF_MIN,
            CRF_MAX,
            score
          );
          return Ok(());
        }
        Decision::Exhausted => {
          error!(
            "{}: VMAF {:.2} still outside {}-{} after {} attempts; keeping the last encode",
            self.stem(),
            score,
            self.settings.vmaf_min,
            self.settings.vmaf_max,
            state.attempt + 1
          );
          return Ok(());
        }
        Decision::Retry(next) => {
          fs::remove_file(&self.output_file)
            .with_context(|| format!("failed to remove rejected encode {:?}", self.output_file))?;
          state = next;
        }
      }
    }
  }

  fn convert_chunked(&self, video: &VideoMeta, audio: &AudioMeta) -> anyhow::Result<()> {
    temp::prepare_scratch(&self.temp)?;

    let keyframes = if self.settings.chunk_mode == ChunkMode::Keyframe {
      probe::keyframe_pts(self.source)?
    } else {
      Vec::new()
    };

    let chunks = split::plan_chunks(
      self.settings,
      &self.temp,
      video.total_frames,
      video.fps,
      &keyframes,
    )?;
    let num_chunks = chunks.len();
    let workers = self.settings.chunk_workers.min(num_chunks).max(1);
    let fps = video.fps;

    info!(
      "{}: {} chunks, {} chunk worker(s)",
      self.stem(),
      num_chunks,
      workers
    );
    if self.verbosity == Verbosity::Normal {
      init_progress_bar(num_chunks as u64, self.stem());
    }

    let (desc_tx, desc_rx) = bounded::<Message<Chunk>>(workers * 2);
    let (prep_tx, prep_rx) = bounded::<Message<Chunk>>(workers * 2);
    // Roomy enough for every chunk plus the sentinel, so the encoder pool
    // never waits on the concatenator.
    let (accept_tx, accept_rx) = bounded::<Message<(u32, PathBuf)>>(num_chunks + 1);

    crossbeam_utils::thread::scope(|s| -> anyhow::Result<()> {
      let audio_handle = if audio.present {
        Some(s.spawn(|_| {
          let result = self.extract_audio(audio);
          if let Err(e) = &result {
            error!("{:#}", e);
            self.ctx.fail();
          }
          result
        }))
      } else {
        None
      };

      // Planner: descriptors in index order, then one sentinel per worker.
      let planner = {
        let desc_tx = desc_tx.clone();
        s.spawn(move |_| {
          for chunk in chunks {
            if !self.ctx.send(&desc_tx, Message::Item(chunk)) {
              return;
            }
          }
          for _ in 0..workers {
            if !self.ctx.send(&desc_tx, Message::Done) {
              return;
            }
          }
        })
      };
      drop(desc_tx);

      let materializers: Vec<_> = (0..workers)
        .map(|_| {
          let rx = desc_rx.clone();
          let tx = prep_tx.clone();
          s.spawn(move |_| {
            if let Err(e) = self.materialize_loop(&rx, &tx, fps) {
              error!("{:#}", e);
              self.ctx.fail();
            }
          })
        })
        .collect();
      drop(prep_tx);
      drop(desc_rx);

      let encoders: Vec<_> = (0..workers)
        .map(|_| {
          let rx = prep_rx.clone();
          let tx = accept_tx.clone();
          s.spawn(move |_| {
            if let Err(e) = self.encode_loop(&rx, &tx, fps) {
              error!("{:#}", e);
              self.ctx.fail();
            }
          })
        })
        .collect();
      drop(prep_rx);

      planner.join().unwrap();
      for handle in materializers {
        handle.join().unwrap();
      }
      for handle in encoders {
        handle.join().unwrap();
      }

      // The pool is drained; only now may the accepted queue be closed.
      self.ctx.send(&accept_tx, Message::Done);
      drop(accept_tx);

      let mut accepted = BTreeMap::new();
      while let Some(msg) = self.ctx.recv(&accept_rx) {
        match msg {
          Message::Item((index, path)) => {
            accepted.insert(index, path);
          }
          Message::Done => break,
        }
      }

      // The concatenator must not start before audio extraction has
      // finished or been proven absent.
      let audio_file = match audio_handle {
        // Extraction failures were logged and flagged by the thread itself.
        Some(handle) => handle.join().unwrap().ok(),
        None => None,
      };

      if self.verbosity == Verbosity::Normal {
        finish_progress_bar();
      }

      if self.ctx.failed() {
        bail!("conversion of {:?} failed", self.source);
      }
      ensure!(
        accepted.len() == num_chunks,
        "only {} of {} chunks were accepted for {:?}",
        accepted.len(),
        num_chunks,
        self.source
      );

      let bitrate = self.effective_audio_bitrate(audio);
      concat::concatenate(
        &self.ctx,
        self.settings,
        &self.temp,
        &accepted,
        audio_file.as_deref().map(|path| (path, bitrate.as_str())),
        &self.output_file,
      )
    })
    .unwrap()?;

    Ok(())
  }

  fn materialize_loop(
    &self,
    rx: &Receiver<Message<Chunk>>,
    tx: &Sender<Message<Chunk>>,
    fps: u32,
  ) -> anyhow::Result<()> {
    while let Some(msg) = self.ctx.recv(rx) {
      let chunk = match msg {
        Message::Done => break,
        Message::Item(chunk) => chunk,
      };

      let cmd = ffmpeg::lossless_cut_cmd(self.settings, self.source, &chunk, fps);
      debug!(
        "chunk {} ({} frames): prepare: {}",
        chunk.index,
        chunk.frames(),
        ffmpeg::pretty_cmd(&cmd)
      );
      ffmpeg::run_command(&self.ctx, &cmd, self.settings.ffmpeg_verbosity)
        .with_context(|| format!("failed to prepare chunk {} of {:?}", chunk.index, self.source))?;

      if !self.ctx.send(tx, Message::Item(chunk)) {
        return Ok(());
      }
    }

    // Tell exactly one encoder the stream is over.
    self.ctx.send(tx, Message::Done);
    Ok(())
  }

  fn encode_loop(
    &self,
    rx: &Receiver<Message<Chunk>>,
    tx: &Sender<Message<(u32, PathBuf)>>,
    fps: u32,
  ) -> anyhow::Result<()> {
    while let Some(msg) = self.ctx.recv(rx) {
      match msg {
        Message::Done => break,
        Message::Item(chunk) => self.search_chunk(&chunk, fps, tx)?,
      }
    }
    Ok(())
  }

  /// The retry loop of one search unit: encode, score, ask the controller,
  /// until the chunk is accepted, given up on, or the attempt budget dies.
  fn search_chunk(
    &self,
    chunk: &Chunk,
    fps: u32,
    tx: &Sender<Message<(u32, PathBuf)>>,
  ) -> anyhow::Result<()> {
    let mut state = SearchState::initial(self.settings);
    let converted = chunk.converted_path();

    loop {
      if self.ctx.failed() {
        return Ok(());
      }

      if self.verbosity == Verbosity::Normal {
        update_bar_msg(format!(
          "chunk {}: CRF {} (attempt {})",
          chunk.index,
          state.crf,
          state.attempt + 1
        ));
      }

      let cmd = ffmpeg::encode_chunk_cmd(self.settings, self.source, chunk, fps, state.crf);
      debug!("chunk {}: encode: {}", chunk.index, ffmpeg::pretty_cmd(&cmd));
      ffmpeg::run_command(&self.ctx, &cmd, self.settings.ffmpeg_verbosity)
        .with_context(|| format!("failed to encode chunk {} of {:?}", chunk.index, self.source))?;

      let score = vmaf::evaluate(
        &self.ctx,
        self.settings,
        &chunk.prepared_path(),
        &converted,
        &chunk.vmaf_log_path(),
      )
      .with_context(|| format!("VMAF check failed on chunk {} of {:?}", chunk.index, self.source))?;

      match target_quality::evaluate(state, score, self.settings) {
        Decision::Accept => {
          info!(
            "chunk {}: VMAF {:.2} inside {}-{} at CRF {} after {} attempt(s)",
            chunk.index,
            score,
            self.settings.vmaf_min,
            self.settings.vmaf_max,
            state.crf,
            state.attempt + 1
          );
          self.accept(chunk, &converted, tx);
          return Ok(());
        }
        Decision::Skip => {
          warn!(
            "chunk {}: next CRF would leave {}-{}; keeping candidate with VMAF {:.2}",
            chunk.index, CRF_MIN, CRF_MAX, score
          );
          self.accept(chunk, &converted, tx);
          return Ok(());
        }
        Decision::Exhausted => {
          bail!(
            "chunk {} of {:?}: VMAF {:.2} still outside {}-{} after {} attempts",
            chunk.index,
            self.source,
            score,
            self.settings.vmaf_min,
            self.settings.vmaf_max,
            state.attempt + 1
          );
        }
        Decision::Retry(next) => {
          info!(
            "chunk {}: VMAF {:.2} outside {}-{}; CRF {} -> {}",
            chunk.index,
            score,
            self.settings.vmaf_min,
            self.settings.vmaf_max,
            state.crf,
            next.crf
          );
          // The encoder refuses to overwrite, so the rejected candidate has
          // to go before the next attempt.
          fs::remove_file(&converted)
            .with_context(|| format!("failed to remove rejected candidate {:?}", converted))?;
          state = next;
        }
      }
    }
  }

  fn accept(&self, chunk: &Chunk, converted: &Path, tx: &Sender<Message<(u32, PathBuf)>>) {
    if self.ctx.send(tx, Message::Item((chunk.index, converted.to_path_buf())))
      && self.verbosity == Verbosity::Normal
    {
      inc_bar(1);
    }

    // The prepared reference only exists for scoring.
    if !self.settings.keep_tmp_files {
      let _ = fs::remove_file(chunk.prepared_path());
    }
  }

  fn extract_audio(&self, audio: &AudioMeta) -> anyhow::Result<PathBuf> {
    let codec = audio.codec_name.as_deref().unwrap_or("mka");
    let dest = self.temp.join(format!("audio.{}", codec));

    info!("{}: extracting audio track ({})", self.stem(), codec);
    let cmd = ffmpeg::extract_audio_cmd(self.settings, self.source, &dest);
    ffmpeg::run_command(&self.ctx, &cmd, self.settings.ffmpeg_verbosity)
      .with_context(|| format!("failed to extract audio from {:?}", self.source))?;

    ensure!(
      dest.exists(),
      "audio extraction produced no file at {:?}",
      dest
    );
    Ok(dest)
  }

  fn effective_audio_bitrate(&self, audio: &AudioMeta) -> String {
    if self.settings.detect_audio_bitrate {
      if let Some(bitrate) = audio.bitrate {
        return bitrate.to_string();
      }
    }
    self.settings.audio_bitrate.clone()
  }

  fn stem(&self) -> String {
    self
      .source
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.source.display().to_string())
  }
}
