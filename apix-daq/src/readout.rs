//! FIFO poll loop and bounded acquisition
//!
//! The hardware offers no blocking read, so the reader busy
//! polls the status bit with microsecond sleeps. There is
//! exactly one unbounded reader (the acquisition worker) and
//! the calibration routines run their own bounded instance
//! of the same loop while the worker is idle - the two never
//! poll the FIFO concurrently.

use std::thread;
use std::time::{Duration,
                Instant};

use apix_dataclasses::errors::ScanError;
use apix_dataclasses::events::PixelHit;
use apix_dataclasses::io::{Event,
                           WordStreamer};
use apix_dataclasses::threading::RunToken;

use crate::control;
use crate::memory::{RegisterError,
                    RegisterFile};

/// Why a read loop returned
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ReadOutcome {
  /// stop was requested through the token
  Stopped,
  /// the wall clock limit elapsed, or the idle limit of
  /// consecutive empty polls was reached
  TimedOut,
}

/// Source of raw protocol words
///
/// The FIFO implements this for data taking, tests drive
/// the loop from a plain vector.
pub trait WordSource {
  fn has_data(&mut self) -> Result<bool, RegisterError>;
  fn next_word(&mut self) -> Result<u32, RegisterError>;
}

/// The hardware FIFO of the readout window
pub struct FifoSource<'a> {
  pub readout : &'a RegisterFile,
}

impl WordSource for FifoSource<'_> {
  fn has_data(&mut self) -> Result<bool, RegisterError> {
    control::fifo_has_data(self.readout)
  }
  fn next_word(&mut self) -> Result<u32, RegisterError> {
    control::read_fifo_word(self.readout)
  }
}

/// Poll words out of `source`, decode them through
/// `streamer` and hand every event to `sink`, strictly in
/// FIFO arrival order
///
/// The loop suspends only in the empty-FIFO branch. On a
/// stop request the streamer is reset, so a partially
/// assembled timestamp dies here and never reaches the
/// sink.
///
/// # Arguments
///
/// * idle_limit : time out after this many consecutive
///                empty polls (None = wait forever)
/// * wall_limit : overall deadline for this read (None =
///                no deadline)
pub fn read_stream<S, F>(source     : &mut S,
                         streamer   : &mut WordStreamer,
                         token      : &RunToken,
                         idle_limit : Option<u32>,
                         wall_limit : Option<Duration>,
                         mut sink   : F) -> ReadOutcome
  where S : WordSource,
        F : FnMut(Event) {
  let start          = Instant::now();
  let mut idle_polls = 0u32;
  loop {
    if token.stop_requested() {
      streamer.reset();
      return ReadOutcome::Stopped;
    }
    if let Some(limit) = wall_limit {
      if start.elapsed() > limit {
        return ReadOutcome::TimedOut;
      }
    }
    match source.has_data() {
      Err(err) => {
        error!("Unable to query the FIFO status! {err}");
        thread::sleep(Duration::from_micros(1));
        continue;
      }
      Ok(false) => {
        thread::sleep(Duration::from_micros(1));
        idle_polls += 1;
        if let Some(limit) = idle_limit {
          if idle_polls >= limit {
            return ReadOutcome::TimedOut;
          }
        }
        continue;
      }
      Ok(true) => ()
    }
    let word = match source.next_word() {
      Ok(word) => word,
      Err(err) => {
        error!("Unable to read from the FIFO! {err}");
        continue;
      }
    };
    idle_polls = 0;
    streamer.consume(word);
    loop {
      match streamer.next() {
        None        => break,
        Some(event) => sink(event),
      }
    }
  }
}

/// Bounded inline acquisition for calibration steps
///
/// Collects the hits of one pulse burst. More hits than
/// `ceiling` is a noise runaway - the step has to be
/// aborted, the caller re-applies the mask and resets the
/// chip before it goes on.
pub fn acquire_hits<S>(source     : &mut S,
                       streamer   : &mut WordStreamer,
                       token      : &RunToken,
                       idle_limit : Option<u32>,
                       wall_limit : Duration,
                       ceiling    : u32) -> Result<Vec<PixelHit>, ScanError>
  where S : WordSource {
  let start          = Instant::now();
  let mut idle_polls = 0u32;
  let mut hits       = Vec::<PixelHit>::new();
  loop {
    if token.stop_requested() {
      streamer.reset();
      break;
    }
    if start.elapsed() > wall_limit {
      break;
    }
    if hits.len() as u32 > ceiling {
      return Err(ScanError::NoiseRunaway { nhits : hits.len() as u32 });
    }
    match source.has_data() {
      Err(err) => {
        error!("Unable to query the FIFO status! {err}");
        thread::sleep(Duration::from_micros(1));
        continue;
      }
      Ok(false) => {
        thread::sleep(Duration::from_micros(1));
        idle_polls += 1;
        if let Some(limit) = idle_limit {
          if idle_polls >= limit {
            break;
          }
        }
        continue;
      }
      Ok(true) => ()
    }
    let word = match source.next_word() {
      Ok(word) => word,
      Err(err) => {
        error!("Unable to read from the FIFO! {err}");
        continue;
      }
    };
    idle_polls = 0;
    streamer.consume(word);
    loop {
      match streamer.next() {
        None                   => break,
        Some(Event::Hit(hit))  => hits.push(hit),
        Some(_)                => (),
      }
    }
  }
  Ok(hits)
}


#[cfg(test)]
mod tests {

  use std::collections::VecDeque;
  use std::time::Duration;

  use apix_dataclasses::io::{Event,
                             WordStreamer};
  use apix_dataclasses::threading::RunToken;

  use super::{ReadOutcome,
              WordSource,
              acquire_hits,
              read_stream};
  use crate::memory::RegisterError;

  /// feeds canned words, then reports an empty FIFO
  struct VecSource {
    words : VecDeque<u32>,
  }

  impl VecSource {
    fn new(words : &[u32]) -> Self {
      Self {
        words : words.iter().copied().collect(),
      }
    }
  }

  impl WordSource for VecSource {
    fn has_data(&mut self) -> Result<bool, RegisterError> {
      Ok(!self.words.is_empty())
    }
    fn next_word(&mut self) -> Result<u32, RegisterError> {
      match self.words.pop_front() {
        Some(word) => Ok(word),
        None       => Err(RegisterError::Unknown),
      }
    }
  }

  fn hit_word(col : u32, row : u32, ts1 : u32, ts2 : u32) -> u32 {
    (1 << 31) | (col << 25) | (row << 16) | (ts1 << 6) | ts2
  }

  #[test]
  fn times_out_on_idle_limit() {
    let mut source   = VecSource::new(&[hit_word(3, 7, 0, 0), 0x0100_0000]);
    let mut streamer = WordStreamer::new(1, true);
    let token        = RunToken::new();
    let mut events   = Vec::<Event>::new();
    let outcome = read_stream(&mut source,
                              &mut streamer,
                              &token,
                              Some(5),
                              None,
                              |ev| events.push(ev));
    assert_eq!(outcome, ReadOutcome::TimedOut);
    assert_eq!(events.len(), 2);
    match events[0] {
      Event::Hit(hit) => {
        assert_eq!(hit.col, 3);
        assert_eq!(hit.row, 7);
      }
      _ => panic!("expected a hit first"),
    }
    assert_eq!(events[1], Event::BufferOverflow);
  }

  #[test]
  fn stops_on_token() {
    let mut source   = VecSource::new(&[hit_word(0, 0, 0, 0)]);
    let mut streamer = WordStreamer::new(1, true);
    let token        = RunToken::new();
    token.request_stop();
    let mut n_events = 0usize;
    let outcome = read_stream(&mut source,
                              &mut streamer,
                              &token,
                              None,
                              None,
                              |_| n_events += 1);
    assert_eq!(outcome, ReadOutcome::Stopped);
    assert_eq!(n_events, 0);
  }

  #[test]
  fn times_out_on_wall_limit() {
    let mut source   = VecSource::new(&[]);
    let mut streamer = WordStreamer::new(1, true);
    let token        = RunToken::new();
    let outcome = read_stream(&mut source,
                              &mut streamer,
                              &token,
                              None,
                              Some(Duration::from_millis(5)),
                              |_| ());
    assert_eq!(outcome, ReadOutcome::TimedOut);
  }

  #[test]
  fn noise_runaway_aborts_the_acquisition() {
    let mut words = Vec::<u32>::new();
    for _ in 0..50 {
      words.push(hit_word(1, 2, 0, 0));
    }
    let mut source   = VecSource::new(&words);
    let mut streamer = WordStreamer::new(1, true);
    let token        = RunToken::new();
    let result = acquire_hits(&mut source,
                              &mut streamer,
                              &token,
                              Some(5),
                              Duration::from_millis(100),
                              10);
    assert!(result.is_err());
  }

  #[test]
  fn bounded_acquisition_collects_hits() {
    let words = [hit_word(1, 2, 0, 0),
                 0x1000_0007,
                 hit_word(4, 5, 0, 0)];
    let mut source   = VecSource::new(&words);
    let mut streamer = WordStreamer::new(1, true);
    let token        = RunToken::new();
    let hits = acquire_hits(&mut source,
                            &mut streamer,
                            &token,
                            Some(5),
                            Duration::from_millis(100),
                            1000).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].col, 1);
    assert_eq!(hits[1].col, 4);
  }
}
