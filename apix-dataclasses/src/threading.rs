//! Thread control structures

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8,
                        Ordering};

const STATE_RUNNING        : u8 = 0;
const STATE_STOP_REQUESTED : u8 = 1;
const STATE_STOPPED        : u8 = 2;

/// Lifecycle of one acquisition worker
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RunState {
  Running,
  StopRequested,
  Stopped,
}

impl fmt::Display for RunState {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = match self {
      RunState::Running       => "Running",
      RunState::StopRequested => "StopRequested",
      RunState::Stopped       => "Stopped",
    };
    write!(f, "<RunState: {}>", repr)
  }
}

/// Cooperative cancellation token shared between the
/// control thread and the acquisition worker
///
/// The control side requests the stop, the worker observes
/// it once per loop iteration and marks the token stopped
/// right before it exits. Observing the token never mutates
/// it.
#[derive(Debug, Clone)]
pub struct RunToken {
  state : Arc<AtomicU8>,
}

impl RunToken {

  pub fn new() -> Self {
    Self {
      state : Arc::new(AtomicU8::new(STATE_RUNNING)),
    }
  }

  pub fn state(&self) -> RunState {
    match self.state.load(Ordering::SeqCst) {
      STATE_RUNNING        => RunState::Running,
      STATE_STOP_REQUESTED => RunState::StopRequested,
      _                    => RunState::Stopped,
    }
  }

  /// Ask the worker to finish. A token which already
  /// stopped stays stopped.
  pub fn request_stop(&self) {
    match self.state.compare_exchange(STATE_RUNNING,
                                      STATE_STOP_REQUESTED,
                                      Ordering::SeqCst,
                                      Ordering::SeqCst) {
      Ok(_)  => (),
      Err(_) => {
        debug!("Stop requested on a token which is not running");
      }
    }
  }

  /// Checked by the worker once per loop iteration
  pub fn stop_requested(&self) -> bool {
    self.state.load(Ordering::SeqCst) != STATE_RUNNING
  }

  /// The worker is about to exit
  pub fn mark_stopped(&self) {
    self.state.store(STATE_STOPPED, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.state.load(Ordering::SeqCst) == STATE_STOPPED
  }
}

impl fmt::Display for RunToken {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<RunToken: {}>", self.state())
  }
}
