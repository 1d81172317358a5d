use quickcheck_macros::quickcheck;

use super::*;
use crate::settings::Settings;
use crate::VmafOffsetMode;

fn window_settings() -> Settings {
  Settings {
    initial_crf: 44,
    initial_crf_step: 1,
    vmaf_min: 90.0,
    vmaf_max: 93.0,
    vmaf_offset_mode: VmafOffsetMode::Threshold,
    vmaf_offset_threshold: 2,
    vmaf_offset_multiplier: 1.3,
    max_attempts: 10,
    ..Settings::default()
  }
}

#[test]
fn search_converges_in_three_attempts() {
  // Gentle multiplier so the 5-point miss on the first attempt still moves
  // by a single CRF unit.
  let settings = Settings {
    vmaf_offset_multiplier: 0.1,
    ..window_settings()
  };
  let scores = |crf: i32| match crf {
    44 => 85.0,
    43 => 89.0,
    42 => 91.0,
    _ => panic!("unexpected CRF {}", crf),
  };

  let mut state = SearchState::initial(&settings);
  let mut encodes = 0;
  loop {
    encodes += 1;
    match evaluate(state, scores(state.crf), &settings) {
      Decision::Retry(next) => state = next,
      Decision::Accept => break,
      other => panic!("unexpected decision {:?}", other),
    }
  }

  assert_eq!(3, encodes);
  assert_eq!(42, state.crf);
}

#[test]
fn scores_on_the_window_bounds_are_accepted() {
  let settings = window_settings();
  let state = SearchState::initial(&settings);

  assert_eq!(Decision::Accept, evaluate(state, 90.0, &settings));
  assert_eq!(Decision::Accept, evaluate(state, 93.0, &settings));
  assert_eq!(Decision::Accept, evaluate(state, 91.5, &settings));
}

#[test]
fn large_deviation_forces_multiplier_stepping() {
  // Threshold mode configured, but a 20-point miss must step by
  // 1 + floor(20 * 1.3) = 27 regardless.
  let settings = window_settings();
  let state = SearchState::initial(&settings);

  match evaluate(state, 70.0, &settings) {
    Decision::Retry(next) => {
      assert_eq!(27, next.step);
      assert_eq!(44 - 27, next.crf);
      assert_eq!(1, next.attempt);
    }
    other => panic!("unexpected decision {:?}", other),
  }
}

#[test]
fn threshold_stepping_is_gradual() {
  let settings = window_settings();
  let state = SearchState::initial(&settings);

  // One point under: floor(1 / 2) = 0 extra, the base step still moves.
  match evaluate(state, 89.0, &settings) {
    Decision::Retry(next) => assert_eq!(43, next.crf),
    other => panic!("unexpected decision {:?}", other),
  }

  // Four points under: floor(4 / 2) = 2 extra.
  match evaluate(state, 86.0, &settings) {
    Decision::Retry(next) => assert_eq!(41, next.crf),
    other => panic!("unexpected decision {:?}", other),
  }

  // Two points over the top bound walks the CRF up instead.
  match evaluate(state, 95.0, &settings) {
    Decision::Retry(next) => assert_eq!(46, next.crf),
    other => panic!("unexpected decision {:?}", other),
  }
}

#[test]
fn crf_leaving_the_low_end_skips() {
  let settings = Settings {
    initial_crf: 2,
    initial_crf_step: 5,
    vmaf_min: 81.0,
    vmaf_max: 85.0,
    ..window_settings()
  };
  let state = SearchState::initial(&settings);

  // Proposed CRF is 2 - 5 = -3, outside the encoder's range.
  assert_eq!(Decision::Skip, evaluate(state, 80.0, &settings));
}

#[test]
fn crf_leaving_the_high_end_skips() {
  let settings = Settings {
    initial_crf: 62,
    ..window_settings()
  };
  let state = SearchState::initial(&settings);

  // 5 over the top forces the multiplier: 62 + 1 + floor(5 * 1.3) = 69.
  assert_eq!(Decision::Skip, evaluate(state, 98.0, &settings));
}

#[test]
fn oscillating_scores_exhaust_the_budget() {
  let settings = Settings {
    vmaf_offset_multiplier: 0.1,
    ..window_settings()
  };
  // Never inside the window: even CRFs score low, odd ones high.
  let scores = |crf: i32| if crf % 2 == 0 { 85.0 } else { 94.0 };

  let mut state = SearchState::initial(&settings);
  let mut encodes = 0;
  let verdict = loop {
    encodes += 1;
    match evaluate(state, scores(state.crf), &settings) {
      Decision::Retry(next) => state = next,
      other => break other,
    }
  };

  assert_eq!(Decision::Exhausted, verdict);
  assert_eq!(settings.max_attempts, encodes);
}

#[quickcheck]
fn retry_stays_in_range_and_moves(crf: u8, step: u8, vmaf: u16, threshold_mode: bool) -> bool {
  let settings = Settings {
    initial_crf: i32::from(crf % 63) + 1,
    initial_crf_step: u32::from(step % 8) + 1,
    vmaf_offset_mode: if threshold_mode {
      VmafOffsetMode::Threshold
    } else {
      VmafOffsetMode::Multiplier
    },
    ..window_settings()
  };
  let state = SearchState::initial(&settings);
  let vmaf = f64::from(vmaf % 1001) / 10.0;

  match evaluate(state, vmaf, &settings) {
    Decision::Retry(next) => {
      (CRF_MIN..=CRF_MAX).contains(&next.crf)
        && (next.crf - state.crf).unsigned_abs() >= settings.initial_crf_step
        && next.attempt == state.attempt + 1
    }
    // The other verdicts carry no state to validate.
    _ => true,
  }
}
