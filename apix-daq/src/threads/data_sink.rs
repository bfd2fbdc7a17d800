//! Writes acquired data to disk
//!
//! Decouples the disk from the FIFO poll loop - the worker
//! never blocks on a write.

use crossbeam_channel::Receiver;

use apix_dataclasses::io::{Event,
                           HitWriter};

/// What travels from the acquisition worker to the sink
#[derive(Debug, Copy, Clone)]
pub enum DaqRecord {
  /// undecoded word (binary mode)
  Raw(u32),
  /// decoded event (text mode)
  Decoded(Event),
}

/// Drain the channel into the writer until all senders are
/// gone
pub fn sink_worker(incoming : Receiver<DaqRecord>, mut writer : HitWriter) {
  loop {
    match incoming.recv() {
      Err(_) => {
        debug!("Sink channel closed, flushing");
        break;
      }
      Ok(DaqRecord::Raw(word)) => {
        match writer.add_word(word) {
          Err(err) => {
            error!("Unable to write a word! {err}");
          }
          Ok(_) => ()
        }
      }
      Ok(DaqRecord::Decoded(event)) => {
        match writer.add_event(&event) {
          Err(err) => {
            error!("Unable to write an event! {err}");
          }
          Ok(_) => ()
        }
      }
    }
  }
  match writer.flush() {
    Err(err) => {
      error!("Unable to flush the run file! {err}");
    }
    Ok(_) => {
      info!("Run file {} closed with {} records", writer.path.display(), writer.n_written());
    }
  }
}
