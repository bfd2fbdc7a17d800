//! The acquisition worker
//!
//! One dedicated thread owns the FIFO for the lifetime of a
//! run. In text mode the words go through the stream
//! decoder, in binary mode they are passed on raw.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use apix_dataclasses::io::{OutputMode,
                           WordStreamer};
use apix_dataclasses::threading::RunToken;

use crate::control;
use crate::memory::RegisterFile;
use crate::readout::{FifoSource,
                     read_stream};
use crate::threads::data_sink::DaqRecord;

/// Read the FIFO until a stop is requested, pushing the
/// acquired data into the sink channel. Returns the number
/// of processed records.
pub fn acquisition_worker(readout       : Arc<RegisterFile>,
                          token         : RunToken,
                          mode          : OutputMode,
                          ckdivend2     : u32,
                          gray_disabled : bool,
                          sender        : Sender<DaqRecord>) -> u64 {
  let n_records = match mode {
    OutputMode::Binary => {
      binary_loop(&readout, &token, &sender)
    }
    _ => {
      decoded_loop(&readout, &token, ckdivend2, gray_disabled, &sender)
    }
  };
  token.mark_stopped();
  info!("Acquisition worker exiting after {} records", n_records);
  n_records
}

fn binary_loop(readout : &RegisterFile,
               token   : &RunToken,
               sender  : &Sender<DaqRecord>) -> u64 {
  let mut n_words = 0u64;
  loop {
    if token.stop_requested() {
      break;
    }
    match control::fifo_has_data(readout) {
      Err(err) => {
        error!("Unable to query the FIFO status! {err}");
        thread::sleep(Duration::from_micros(1));
        continue;
      }
      Ok(false) => {
        thread::sleep(Duration::from_micros(1));
        continue;
      }
      Ok(true) => ()
    }
    match control::read_fifo_word(readout) {
      Err(err) => {
        error!("Unable to read from the FIFO! {err}");
      }
      Ok(word) => {
        n_words += 1;
        match sender.send(DaqRecord::Raw(word)) {
          Err(err) => {
            error!("Unable to send a word to the sink! {err}");
          }
          Ok(_) => ()
        }
      }
    }
  }
  n_words
}

fn decoded_loop(readout       : &RegisterFile,
                token         : &RunToken,
                ckdivend2     : u32,
                gray_disabled : bool,
                sender        : &Sender<DaqRecord>) -> u64 {
  let mut streamer = WordStreamer::new(ckdivend2, gray_disabled);
  let mut source   = FifoSource { readout : readout };
  let mut n_events = 0u64;
  read_stream(&mut source,
              &mut streamer,
              token,
              None,
              None,
              |event| {
    n_events += 1;
    match sender.send(DaqRecord::Decoded(event)) {
      Err(err) => {
        error!("Unable to send an event to the sink! {err}");
      }
      Ok(_) => ()
    }
  });
  n_events
}
