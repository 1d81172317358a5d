use std::time::{Duration, Instant};

use crossbeam_channel::bounded;

use super::*;

#[test]
fn recv_unblocks_when_the_failure_flag_is_raised() {
  let ctx = RunContext::new();
  let (_tx, rx) = bounded::<u32>(1);

  let started = Instant::now();
  crossbeam_utils::thread::scope(|s| {
    let ctx2 = ctx.clone();
    s.spawn(move |_| {
      std::thread::sleep(Duration::from_millis(50));
      ctx2.fail();
    });
    assert_eq!(None, ctx.recv(&rx));
  })
  .unwrap();

  // One check interval plus slack, not a hang.
  assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn send_gives_up_on_a_full_queue_once_failed() {
  let ctx = RunContext::new();
  let (tx, _rx) = bounded::<u32>(1);
  assert!(ctx.send(&tx, 1));

  ctx.fail();
  assert!(!ctx.send(&tx, 2));
}

#[test]
fn send_and_recv_pass_values_through() {
  let ctx = RunContext::new();
  let (tx, rx) = bounded::<u32>(2);

  assert!(ctx.send(&tx, 7));
  assert_eq!(Some(7), ctx.recv(&rx));

  drop(tx);
  assert_eq!(None, ctx.recv(&rx));
}

#[test]
fn file_scopes_share_the_interrupt_but_not_the_failure() {
  let root = RunContext::new();
  let file_a = root.file_scope();
  let file_b = root.file_scope();

  file_a.fail();
  assert!(file_a.failed());
  assert!(!file_b.failed());
  assert!(!root.failed());

  root.interrupt();
  assert!(file_b.failed());
  assert!(file_b.interrupted());
}
