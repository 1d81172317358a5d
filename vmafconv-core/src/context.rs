#[cfg(test)]
mod tests;

use std::io;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;

/// Interval at which blocking operations re-check the failure flag.
pub const CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct ChildRegistry {
  next_id: AtomicU64,
  children: Mutex<Vec<(u64, Arc<Mutex<Child>>)>>,
}

/// State shared by the stages of a run: the user-interrupt flag, the
/// registry of live child processes, and a failure flag scoped to the file
/// currently being converted.
///
/// One value is created per invocation and handed down explicitly; nothing
/// in here is a process-wide singleton. [`RunContext::file_scope`] derives a
/// context whose failure flag is fresh, so one failed file cannot cancel
/// the others, while an interrupt still reaches everything.
#[derive(Clone)]
pub struct RunContext {
  interrupted: Arc<AtomicBool>,
  failure: Arc<AtomicBool>,
  registry: Arc<ChildRegistry>,
}

impl Default for RunContext {
  fn default() -> Self {
    Self::new()
  }
}

impl RunContext {
  pub fn new() -> Self {
    Self {
      interrupted: Arc::new(AtomicBool::new(false)),
      failure: Arc::new(AtomicBool::new(false)),
      registry: Arc::new(ChildRegistry::default()),
    }
  }

  /// A context for one file: same interrupt plane, fresh failure flag.
  pub fn file_scope(&self) -> Self {
    Self {
      interrupted: Arc::clone(&self.interrupted),
      failure: Arc::new(AtomicBool::new(false)),
      registry: Arc::clone(&self.registry),
    }
  }

  /// Raised by any worker on a fatal error. Workers observe it at their next
  /// blocking point and wind down without starting new work; already running
  /// child processes are left to finish.
  pub fn fail(&self) {
    if !self.failure.swap(true, Ordering::SeqCst) {
      debug!("failure flag raised");
    }
  }

  pub fn failed(&self) -> bool {
    self.failure.load(Ordering::SeqCst) || self.interrupted()
  }

  /// Marks the run as user-interrupted and kills all registered children.
  /// Unlike a plain failure, running ffmpeg processes are not allowed to
  /// finish; their partial outputs are garbage by definition.
  pub fn interrupt(&self) {
    self.interrupted.store(true, Ordering::SeqCst);
    self.kill_children();
  }

  pub fn interrupted(&self) -> bool {
    self.interrupted.load(Ordering::SeqCst)
  }

  /// Puts a spawned child under supervision so an interrupt can reach it.
  pub fn adopt_child(&self, child: Child) -> (u64, Arc<Mutex<Child>>) {
    let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
    let child = Arc::new(Mutex::new(child));
    self.registry.children.lock().push((id, Arc::clone(&child)));
    (id, child)
  }

  pub fn release_child(&self, id: u64) {
    self.registry.children.lock().retain(|(cid, _)| *cid != id);
  }

  pub fn kill_children(&self) {
    for (id, child) in self.registry.children.lock().iter() {
      if child.lock().kill().is_ok() {
        debug!("killed child process #{}", id);
      }
    }
  }

  /// Polls the child to completion. A child hit by `interrupt` dies and is
  /// reaped here like any other exit.
  pub fn wait_child(&self, child: &Arc<Mutex<Child>>) -> io::Result<ExitStatus> {
    loop {
      if let Some(status) = child.lock().try_wait()? {
        return Ok(status);
      }
      std::thread::sleep(CHECK_INTERVAL);
    }
  }

  /// Blocking send that gives up when the failure flag is raised or the
  /// receiving side is gone. Returns whether the value was delivered.
  pub fn send<T>(&self, tx: &Sender<T>, value: T) -> bool {
    let mut value = value;
    while !self.failed() {
      match tx.send_timeout(value, CHECK_INTERVAL) {
        Ok(()) => return true,
        Err(SendTimeoutError::Timeout(v)) => value = v,
        Err(SendTimeoutError::Disconnected(_)) => return false,
      }
    }
    false
  }

  /// Blocking receive with the same cancellation contract as `send`.
  pub fn recv<T>(&self, rx: &Receiver<T>) -> Option<T> {
    while !self.failed() {
      match rx.recv_timeout(CHECK_INTERVAL) {
        Ok(value) => return Some(value),
        Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => return None,
      }
    }
    None
  }
}
