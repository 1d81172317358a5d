use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use once_cell::sync::OnceCell;

static PROGRESS_BAR: OnceCell<ProgressBar> = OnceCell::new();

fn bar() -> &'static ProgressBar {
  PROGRESS_BAR.get_or_init(|| ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden()))
}

/// (Re)arms the bar for one file: length is the planned chunk count.
pub fn init_progress_bar(len: u64, prefix: String) {
  let pb = bar();
  pb.set_style(
    ProgressStyle::with_template("{prefix:.bold} {wide_bar:.cyan/blue} {pos}/{len} chunks {msg}")
      .unwrap()
      .progress_chars("#>-"),
  );
  pb.set_draw_target(ProgressDrawTarget::stderr());
  pb.set_prefix(prefix);
  pb.set_length(len);
  pb.set_message("");
  pb.reset();
}

pub fn inc_bar(delta: u64) {
  bar().inc(delta);
}

pub fn update_bar_msg(msg: String) {
  bar().set_message(msg);
}

pub fn finish_progress_bar() {
  bar().finish_and_clear();
}
