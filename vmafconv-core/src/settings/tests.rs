use super::*;

fn valid_settings() -> (tempfile::TempDir, Settings) {
  let root = tempfile::tempdir().unwrap();
  let input_dir = root.path().join("in");
  std::fs::create_dir(&input_dir).unwrap();

  let settings = Settings {
    input_dir,
    output_dir: root.path().join("out"),
    tmp_dir: root.path().join("tmp"),
    ..Settings::default()
  };
  (root, settings)
}

#[test]
fn a_sane_configuration_passes() {
  let (_root, settings) = valid_settings();
  settings.validate().unwrap();
}

#[test]
fn missing_input_directory_is_refused() {
  let (_root, mut settings) = valid_settings();
  settings.input_dir = settings.input_dir.join("nope");
  assert!(settings.validate().is_err());
}

#[test]
fn identical_input_and_output_directory_is_refused() {
  let (_root, mut settings) = valid_settings();
  settings.output_dir = settings.input_dir.clone();
  assert!(settings.validate().is_err());
}

#[test]
fn scratch_inside_input_or_output_is_refused() {
  let (_root, mut settings) = valid_settings();
  settings.tmp_dir = settings.input_dir.clone();
  assert!(settings.validate().is_err());
}

#[test]
fn inverted_vmaf_window_is_refused() {
  let (_root, mut settings) = valid_settings();
  settings.vmaf_min = 95.0;
  settings.vmaf_max = 90.0;
  assert!(settings.validate().is_err());
}

#[test]
fn out_of_range_crf_is_refused() {
  let (_root, mut settings) = valid_settings();
  settings.initial_crf = 0;
  assert!(settings.validate().is_err());
  settings.initial_crf = 64;
  assert!(settings.validate().is_err());
}

#[test]
fn malformed_audio_bitrate_is_refused() {
  let (_root, mut settings) = valid_settings();
  settings.audio_bitrate = "lots".into();
  assert!(settings.validate().is_err());

  settings.audio_bitrate = "192k".into();
  settings.validate().unwrap();
  settings.audio_bitrate = "320K".into();
  settings.validate().unwrap();
  settings.audio_bitrate = "128000".into();
  settings.validate().unwrap();
}

#[test]
fn wildcard_output_extension_is_refused() {
  let (_root, mut settings) = valid_settings();
  settings.output_ext = "*".into();
  assert!(settings.validate().is_err());
}

#[test]
fn verbosity_args_follow_the_level() {
  let (_root, mut settings) = valid_settings();

  settings.ffmpeg_verbosity = 0;
  assert_eq!(
    vec!["-hide_banner", "-loglevel", "error"],
    settings.ffmpeg_verbosity_args()
  );

  settings.ffmpeg_verbosity = 1;
  assert!(settings
    .ffmpeg_verbosity_args()
    .contains(&"-stats".to_owned()));

  settings.ffmpeg_verbosity = 2;
  assert_eq!(vec!["-hide_banner"], settings.ffmpeg_verbosity_args());
}
