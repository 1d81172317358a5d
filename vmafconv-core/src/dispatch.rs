#[cfg(test)]
mod tests;

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use crossbeam_channel::bounded;

use crate::broker::Broker;
use crate::context::RunContext;
use crate::settings::Settings;
use crate::temp;
use crate::Verbosity;

/// Enumerates the input directory and drives one pipeline per file, up to
/// `file_workers` concurrently. A failed file is logged and the run moves
/// on; only a user interrupt stops the batch.
pub fn process_files(
  settings: &Settings,
  ctx: &RunContext,
  verbosity: Verbosity,
) -> anyhow::Result<()> {
  fs::create_dir_all(&settings.output_dir)
    .with_context(|| format!("failed to create output directory {:?}", settings.output_dir))?;
  fs::create_dir_all(&settings.tmp_dir)
    .with_context(|| format!("failed to create scratch directory {:?}", settings.tmp_dir))?;

  let files = collect_inputs(settings)?;
  if files.is_empty() {
    info!(
      "no files with the extension {:?} in {:?}",
      settings.input_ext, settings.input_dir
    );
    return Ok(());
  }

  info!("found {} file(s) to convert", files.len());

  let workers = settings.file_workers.min(files.len());
  let (tx, rx) = bounded(files.len());
  for file in files {
    // Capacity equals the file count; these sends cannot block.
    let _ = tx.send(file);
  }
  drop(tx);

  crossbeam_utils::thread::scope(|s| {
    for _ in 0..workers {
      let rx = rx.clone();
      s.spawn(move |_| {
        while let Ok(file) = rx.recv() {
          if ctx.interrupted() {
            return;
          }
          convert_file(settings, ctx, verbosity, &file);
        }
      });
    }
  })
  .unwrap();

  Ok(())
}

/// Input files matching `input_ext` (`*` matches anything), name-sorted so
/// runs are deterministic.
fn collect_inputs(settings: &Settings) -> anyhow::Result<Vec<PathBuf>> {
  let mut files: Vec<PathBuf> = fs::read_dir(&settings.input_dir)
    .with_context(|| format!("failed to read input directory {:?}", settings.input_dir))?
    .filter_map(Result::ok)
    .map(|entry| entry.path())
    .filter(|path| path.is_file() && matches_ext(path, &settings.input_ext))
    .collect();
  files.sort();
  Ok(files)
}

fn matches_ext(path: &Path, input_ext: &str) -> bool {
  if input_ext == "*" {
    return true;
  }
  path
    .extension()
    .map_or(false, |ext| ext.eq_ignore_ascii_case(input_ext))
}

/// The resumption rule: any file in the output directory with the same stem,
/// whatever its extension, marks the input as already converted.
fn already_converted(output_dir: &Path, stem: &OsStr) -> bool {
  fs::read_dir(output_dir)
    .map(|entries| {
      entries
        .filter_map(Result::ok)
        .any(|entry| entry.path().file_stem() == Some(stem))
    })
    .unwrap_or(false)
}

fn convert_file(settings: &Settings, ctx: &RunContext, verbosity: Verbosity, file: &Path) {
  let stem = match file.file_stem() {
    Some(stem) => stem.to_owned(),
    None => return,
  };

  // Concurrent files would fight over the single progress bar.
  let verbosity = if settings.file_workers > 1 && verbosity == Verbosity::Normal {
    Verbosity::Quiet
  } else {
    verbosity
  };

  if already_converted(&settings.output_dir, &stem) {
    info!("already converted {:?}, skipping", file.file_name());
    return;
  }

  let temp = settings.tmp_dir.join(&stem);
  let output_file = settings.output_dir.join(format!(
    "{}.{}",
    stem.to_string_lossy(),
    settings.output_ext
  ));

  let broker = Broker {
    settings,
    ctx: ctx.file_scope(),
    source: file,
    temp: temp.clone(),
    output_file,
    verbosity,
  };

  let started = Instant::now();
  match broker.encode_file() {
    Ok(()) => info!(
      "converted {:?} in {:.1}s",
      file.file_name(),
      started.elapsed().as_secs_f64()
    ),
    Err(e) => {
      if ctx.interrupted() {
        warn!("conversion of {:?} interrupted", file.file_name());
      } else {
        error!("giving up on {:?}: {:#}", file.file_name(), e);
      }
    }
  }

  if !settings.keep_tmp_files {
    temp::clean_scratch(&temp);
  }
}
