#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::settings::{Settings, CRF_MAX, CRF_MIN};
use crate::VmafOffsetMode;

/// Deviation at which threshold stepping is forced over to multiplier
/// stepping, whatever the configured mode says. Keeps a badly missed target
/// from crawling toward the window one unit at a time.
const FORCED_MULTIPLIER_AT: f64 = 5.0;

/// Mutable state of one quality search. Created when the unit enters the
/// encoder, advanced only by [`evaluate`], dropped when the unit is
/// accepted, skipped, or the search errors out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchState {
  pub crf: i32,
  pub step: u32,
  /// Encode attempts already spent on this unit.
  pub attempt: u32,
}

impl SearchState {
  pub fn initial(settings: &Settings) -> Self {
    Self {
      crf: settings.initial_crf,
      step: settings.initial_crf_step,
      attempt: 0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  /// VMAF landed inside the window; the unit is done.
  Accept,
  /// Encode again with the contained state.
  Retry(SearchState),
  /// The next CRF would leave the encoder's supported range; keep the most
  /// recent candidate and end the search.
  Skip,
  /// The attempt budget is spent.
  Exhausted,
}

/// One step of the quality search, taken after every encode + VMAF
/// measurement. Pure: reads nothing but its arguments and never touches the
/// filesystem.
pub fn evaluate(state: SearchState, vmaf: f64, settings: &Settings) -> Decision {
  // Closed interval: a score equal to either bound is in-window.
  if settings.vmaf_min <= vmaf && vmaf <= settings.vmaf_max {
    return Decision::Accept;
  }

  if state.attempt + 1 >= settings.max_attempts {
    return Decision::Exhausted;
  }

  let below = vmaf < settings.vmaf_min;
  let deviation = if below {
    settings.vmaf_min - vmaf
  } else {
    vmaf - settings.vmaf_max
  };

  // Every iteration starts over from the configured base step; only the
  // current deviation grows it.
  let mut step = settings.initial_crf_step;
  if settings.vmaf_offset_mode == VmafOffsetMode::Threshold && deviation < FORCED_MULTIPLIER_AT {
    step += (deviation / f64::from(settings.vmaf_offset_threshold)) as u32;
  } else {
    step += (deviation * settings.vmaf_offset_multiplier) as u32;
  }

  let next_crf = if below {
    i64::from(state.crf) - i64::from(step)
  } else {
    i64::from(state.crf) + i64::from(step)
  };

  if !(i64::from(CRF_MIN)..=i64::from(CRF_MAX)).contains(&next_crf) {
    return Decision::Skip;
  }

  Decision::Retry(SearchState {
    crf: next_crf as i32,
    step,
    attempt: state.attempt + 1,
  })
}
