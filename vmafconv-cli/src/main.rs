#[macro_use]
extern crate log;

use std::time::{Duration, Instant};

use ansi_term::Color;
use anyhow::Context;
use clap::Parser;

use vmafconv_cli::CliOpts;
use vmafconv_core::context::RunContext;
use vmafconv_core::{dispatch, temp, Verbosity};

fn main() -> anyhow::Result<()> {
  let opts = CliOpts::parse();

  let mut settings = vmafconv_cli::load_settings(&opts.settings_file)?;
  vmafconv_cli::apply_overrides(&mut settings, &opts);
  settings.validate()?;

  // The log file lives under the scratch root, which therefore has to exist
  // before logging comes up.
  std::fs::create_dir_all(&settings.tmp_dir)
    .with_context(|| format!("failed to create scratch directory {:?}", settings.tmp_dir))?;
  vmafconv_cli::init_logging(&opts, &settings)?;

  settings.startup_check()?;

  let verbosity = if opts.quiet {
    Verbosity::Quiet
  } else if opts.verbose {
    Verbosity::Verbose
  } else if atty::is(atty::Stream::Stderr) {
    Verbosity::Normal
  } else {
    Verbosity::Quiet
  };

  if verbosity != Verbosity::Quiet {
    eprintln!(
      "{}{} {}  {}{} {}x{}  {}{} {}",
      Color::Green.bold().paint("Q"),
      Color::Green.paint("uality"),
      Color::Green
        .bold()
        .paint(format!("{}-{}", settings.vmaf_min, settings.vmaf_max)),
      Color::Blue.bold().paint("W"),
      Color::Blue.paint("orkers"),
      Color::Blue.bold().paint(settings.file_workers.to_string()),
      Color::Blue.bold().paint(settings.chunk_workers.to_string()),
      Color::Purple.bold().paint("C"),
      Color::Purple.paint("hunking"),
      Color::Purple.bold().paint(settings.chunk_mode.to_string()),
    );
  }

  let ctx = RunContext::new();

  {
    let ctx = ctx.clone();
    let tmp_dir = settings.tmp_dir.clone();
    let keep_tmp_files = settings.keep_tmp_files;
    ctrlc::set_handler(move || {
      eprintln!("\nInterrupted, stopping all workers...");
      ctx.interrupt();
      // Give the killed children a moment to die before sweeping up.
      std::thread::sleep(Duration::from_secs(1));
      temp::clean_run(&tmp_dir, keep_tmp_files);
      std::process::exit(1);
    })
    .context("failed to install the interrupt handler")?;
  }

  let started = Instant::now();
  let result = dispatch::process_files(&settings, &ctx, verbosity);
  temp::clean_run(&settings.tmp_dir, settings.keep_tmp_files);
  result?;

  info!("finished in {:.1}s", started.elapsed().as_secs_f64());
  Ok(())
}
