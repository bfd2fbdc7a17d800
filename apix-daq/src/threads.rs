//! Worker threads of the acquisition side

pub mod runner;
pub mod data_sink;

use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::unbounded;

use apix_dataclasses::io::{HitWriter,
                           OutputMode};
use apix_dataclasses::threading::RunToken;

use crate::memory::RegisterFile;
use crate::threads::data_sink::DaqRecord;

/// Owns the single acquisition worker of one device
///
/// Start and stop are not reentrant and have to come from
/// the same control thread. While a worker is alive nothing
/// else may poll the FIFO.
pub struct AcquisitionSupervisor {
  token  : Option<RunToken>,
  worker : Option<JoinHandle<u64>>,
  sink   : Option<JoinHandle<()>>,
}

impl AcquisitionSupervisor {

  pub fn new() -> Self {
    Self {
      token  : None,
      worker : None,
      sink   : None,
    }
  }

  pub fn is_running(&self) -> bool {
    self.worker.is_some()
  }

  /// Launch the worker and sink threads. Warns and does
  /// nothing when a worker is already alive.
  pub fn start(&mut self,
               readout       : Arc<RegisterFile>,
               mode          : OutputMode,
               writer        : HitWriter,
               ckdivend2     : u32,
               gray_disabled : bool) {
    if self.worker.is_some() {
      warn!("Data acquisition is already running!");
      return;
    }
    let token              = RunToken::new();
    let (ev_send, ev_recv) = unbounded::<DaqRecord>();

    let token_c = token.clone();
    self.worker = Some(thread::spawn(move || {
      runner::acquisition_worker(readout,
                                 token_c,
                                 mode,
                                 ckdivend2,
                                 gray_disabled,
                                 ev_send)
    }));
    self.sink = Some(thread::spawn(move || {
      data_sink::sink_worker(ev_recv, writer)
    }));
    self.token = Some(token);
    info!("Acquisition started");
  }

  /// Request the stop and block until the worker has
  /// observably exited. After this returns no thread
  /// touches the readout registers anymore.
  pub fn stop(&mut self) -> Option<u64> {
    let token = match self.token.take() {
      None => {
        warn!("No acquisition is running!");
        return None;
      }
      Some(token) => token,
    };
    token.request_stop();
    let mut n_words : Option<u64> = None;
    if let Some(handle) = self.worker.take() {
      match handle.join() {
        Ok(words) => {
          n_words = Some(words);
        }
        Err(_) => {
          error!("The acquisition worker panicked!");
        }
      }
    }
    if !token.is_stopped() {
      error!("The worker exited without marking its token!");
    }
    // the worker dropped its sender, the sink drains and ends
    if let Some(handle) = self.sink.take() {
      match handle.join() {
        Ok(_)  => (),
        Err(_) => {
          error!("The data sink panicked!");
        }
      }
    }
    n_words
  }
}
