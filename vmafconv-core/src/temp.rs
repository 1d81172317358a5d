#[cfg(test)]
mod tests;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;

use crate::util::ensure_dir;

/// Creates one file's scratch tree, wiping whatever an earlier run left
/// behind under the same name.
pub fn prepare_scratch(dir: &Path) -> anyhow::Result<()> {
  if dir.is_dir() {
    fs::remove_dir_all(dir)
      .with_context(|| format!("failed to wipe scratch directory {:?}", dir))?;
  }
  fs::create_dir_all(dir).with_context(|| format!("failed to create scratch directory {:?}", dir))?;
  ensure_dir(&dir.join("prepared"))?;
  ensure_dir(&dir.join("converted"))?;
  Ok(())
}

/// Removes one file's scratch tree. Failures are logged, not fatal: cleanup
/// runs on error paths where a second error would only shadow the first.
pub fn clean_scratch(dir: &Path) {
  if dir.is_dir() {
    if let Err(e) = fs::remove_dir_all(dir) {
      warn!("failed to delete scratch directory {:?}: {}", dir, e);
    }
  }
}

/// End-of-run cleanup. The scratch root goes unless the user asked to keep
/// it; stray ffmpeg artefacts that can land outside it go individually.
pub fn clean_run(tmp_dir: &Path, keep_tmp_files: bool) {
  if keep_tmp_files {
    info!("keeping scratch directory {:?}", tmp_dir);
  } else {
    clean_scratch(tmp_dir);
  }

  for stray in ["log.json", "ffmpeg2pass-0.log"] {
    match fs::remove_file(stray) {
      Ok(()) => debug!("removed stray {}", stray),
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => warn!("failed to remove stray {}: {}", stray, e),
    }
  }
}
