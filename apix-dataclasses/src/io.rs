//! Word stream decoding and hit logging
//!
//! The `WordStreamer` turns the raw 32bit words coming out
//! of the readout FIFO into `Event`s. It keeps the
//! multi-word timestamp assembly state between words, so a
//! single instance has to see the stream in FIFO order and
//! must not be shared between readers.

use std::collections::VecDeque;
use std::fmt;
use std::fs::{self,
              File};
use std::io;
use std::io::Write;
use std::path::{Path,
                PathBuf};

use chrono::Utc;
use crossbeam_channel::Sender;

use crate::events::{ControlRecord,
                    PixelHit,
                    TriggerRecord,
                    Word,
                    decode_hit};

/// Everything the decoded stream can emit
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Event {
  Hit(PixelHit),
  Trigger(TriggerRecord),
  BufferOverflow,
  BusyAsserted(u32),
  T0(u32),
  SerdesLockLost,
  SerdesLockEstablished,
  WeirdData(u32),
  Unknown(u8),
}

impl fmt::Display for Event {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr : String;
    match self {
      Event::Hit(hit)               => repr = format!("{}", hit),
      Event::Trigger(trg)           => repr = format!("{}", trg),
      Event::BufferOverflow         => repr = String::from("BUFFER_OVERFLOW"),
      Event::BusyAsserted(ts)       => repr = format!("BUSY_ASSERTED {}", ts),
      Event::T0(ts)                 => repr = format!("T0 {}", ts),
      Event::SerdesLockLost         => repr = String::from("SERDES_LOCK_LOST"),
      Event::SerdesLockEstablished  => repr = String::from("SERDES_LOCK_ESTABLISHED"),
      Event::WeirdData(raw)         => repr = format!("WEIRD_DATA {:x}", raw),
      Event::Unknown(tag)           => repr = format!("UNKNOWN_TAG {:#x}", tag),
    }
    write!(f, "<Event: {}>", repr)
  }
}

/// Emit events from a stream of raw FIFO words
///
/// Hits get stamped with the last *completed* trigger
/// record - a partially assembled timestamp never reaches a
/// hit or a `TriggerRecord`.
pub struct WordStreamer {
  /// ckdivend2 field of the current chip configuration,
  /// read once when the streamer is set up
  pub ckdivend2     : u32,
  /// the chip Gray-decodes its counters on-chip
  pub gray_disabled : bool,
  pub ev_sender     : Option<Sender<Event>>,
  /// partial 64 bit timestamp
  acc_ts            : u64,
  /// partial trigger counter
  acc_trigger       : u32,
  /// a fragment of the current record has arrived
  assembling        : bool,
  /// last completed timestamp, attached to subsequent hits
  last_ts           : u64,
  /// last completed trigger counter
  last_trigger      : u32,
  /// running 24 bit coarse counter from the chip
  bincounter        : u32,
  events            : VecDeque<Event>,
}

impl WordStreamer {

  pub fn new(ckdivend2 : u32, gray_disabled : bool) -> Self {
    Self {
      ckdivend2     : ckdivend2,
      gray_disabled : gray_disabled,
      ev_sender     : None,
      acc_ts        : 0,
      acc_trigger   : 0,
      assembling    : false,
      last_ts       : 0,
      last_trigger  : 0,
      bincounter    : 0,
      events        : VecDeque::<Event>::new(),
    }
  }

  pub fn init_sender(&mut self, ev_sender : Sender<Event>) {
    self.ev_sender = Some(ev_sender);
  }

  /// Feed one raw word
  pub fn consume(&mut self, word : u32) {
    match Word::classify(word) {
      Word::Hit(raw) => {
        let mut hit       = decode_hit(raw, self.ckdivend2, self.gray_disabled);
        hit.fpga_ts       = self.last_ts;
        hit.trigger_count = self.last_trigger;
        self.events.push_back(Event::Hit(hit));
      }
      Word::Control(rec) => {
        self.digest(rec);
      }
    }
  }

  fn digest(&mut self, rec : ControlRecord) {
    match rec {
      ControlRecord::BinCounterFragment(bits) => {
        self.bincounter |= bits & 0xFFFFFF;
      }
      ControlRecord::BufferOverflow => {
        self.events.push_back(Event::BufferOverflow);
      }
      ControlRecord::TriggerCountFragment(low24) => {
        self.acc_trigger = low24;
        self.assembling  = true;
      }
      ControlRecord::TriggerEndWithTimestamp(raw) => {
        self.acc_trigger |= (raw << 8) & 0xFF00_0000;
        self.acc_ts      |= ((raw as u64) << 48) & 0xFFFF_0000_0000_0000;
        self.assembling   = true;
      }
      ControlRecord::TimestampContinuation(mid24) => {
        self.acc_ts    |= (mid24 as u64) << 24;
        self.assembling = true;
      }
      ControlRecord::TimestampEnd(low24) => {
        self.acc_ts |= low24 as u64;
        let record = TriggerRecord {
          trigger_count : self.acc_trigger,
          fpga_ts       : self.acc_ts,
        };
        self.last_ts      = self.acc_ts;
        self.last_trigger = self.acc_trigger;
        self.acc_ts       = 0;
        self.assembling   = false;
        self.events.push_back(Event::Trigger(record));
      }
      ControlRecord::BusyAsserted(ts) => {
        self.events.push_back(Event::BusyAsserted(ts));
      }
      ControlRecord::T0Registered(ts) => {
        // the T0 signal restarts the timestamp base
        self.acc_ts      = 0;
        self.acc_trigger = 0;
        self.assembling  = false;
        self.last_ts     = ts as u64;
        self.events.push_back(Event::T0(ts));
      }
      ControlRecord::SerdesLockLost => {
        self.events.push_back(Event::SerdesLockLost);
      }
      ControlRecord::SerdesLockEstablished => {
        self.events.push_back(Event::SerdesLockEstablished);
      }
      ControlRecord::WeirdData(raw) => {
        self.events.push_back(Event::WeirdData(raw));
      }
      ControlRecord::Unknown(tag) => {
        warn!("Word with unknown tag {:#x} in the stream!", tag);
        self.events.push_back(Event::Unknown(tag));
      }
    }
  }

  /// Next decoded event, None when drained
  pub fn next(&mut self) -> Option<Event> {
    self.events.pop_front()
  }

  /// Push all pending events into the configured sender
  pub fn send_all(&mut self) {
    loop {
      match self.next() {
        None => {
          trace!("Streamer drained!");
          break;
        }
        Some(event) => {
          match self.ev_sender.as_ref().expect("Sender needs to be initialized first!").send(event) {
            Ok(_)    => (),
            Err(err) => {
              error!("Unable to send event! {err}");
            }
          }
        }
      }
    }
  }

  /// Drop any partially assembled timestamp and all pending
  /// events. Called on stream restart - a half built 64 bit
  /// value must never reach a consumer.
  pub fn reset(&mut self) {
    if self.assembling {
      debug!("Discarding a partially assembled timestamp");
    }
    self.acc_ts       = 0;
    self.acc_trigger  = 0;
    self.assembling   = false;
    self.last_ts      = 0;
    self.last_trigger = 0;
    self.bincounter   = 0;
    self.events.clear();
  }

  /// The running coarse counter as last reported by the chip
  pub fn bincounter(&self) -> u32 {
    self.bincounter
  }

  /// A fragment of an unfinished trigger record has arrived
  pub fn is_assembling(&self) -> bool {
    self.assembling
  }
}


/// Output format of the acquisition worker
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum OutputMode {
  /// raw words appended to a .bin dump
  Binary,
  /// decoded events as text lines
  Text,
  /// no worker, words are polled manually
  Raw,
}

impl OutputMode {
  pub fn from_name(name : &str) -> OutputMode {
    match name {
      "binary" => OutputMode::Binary,
      "text"   => OutputMode::Text,
      "raw"    => OutputMode::Raw,
      _        => {
        info!("Data type '{}' not recognized, using binary", name);
        OutputMode::Binary
      }
    }
  }
}

/// Writes acquired data to disk
///
/// In binary mode the raw words go to the file unaltered,
/// in text mode decoded events are written as one line per
/// record.
pub struct HitWriter {
  pub path  : PathBuf,
  mode      : OutputMode,
  file      : File,
  n_written : usize,
}

impl HitWriter {

  pub fn new(output_dir : &Path, mode : OutputMode) -> io::Result<HitWriter> {
    fs::create_dir_all(output_dir)?;
    let stamp = Utc::now().format("%y%m%d_%H%M%S");
    let fname = match mode {
      OutputMode::Binary => format!("run_{}.bin", stamp),
      _                  => format!("run_{}.txt", stamp),
    };
    let path     = output_dir.join(fname);
    let mut file = File::create(&path)?;
    if mode == OutputMode::Text {
      writeln!(file, "X:\tY:\tTS1:\tTS2:\tTOT:\tFPGA_TS:\tTR_CNT:")?;
    }
    info!("Writing run data to {}", path.display());
    Ok(HitWriter {
      path      : path,
      mode      : mode,
      file      : file,
      n_written : 0,
    })
  }

  /// Append one raw word (binary mode)
  pub fn add_word(&mut self, word : u32) -> io::Result<()> {
    self.file.write_all(&word.to_le_bytes())?;
    self.n_written += 1;
    Ok(())
  }

  /// Append one decoded event (text mode)
  pub fn add_event(&mut self, event : &Event) -> io::Result<()> {
    match event {
      Event::Hit(hit) => {
        writeln!(self.file, "HIT {}\t{}\t{}\t{}\t{}\t{}\t{}",
                 hit.col, hit.row, hit.ts1, hit.ts2, hit.tot,
                 hit.fpga_ts, hit.trigger_count)?;
      }
      Event::Trigger(trg) => {
        writeln!(self.file, "TRIGGER {} {}", trg.trigger_count, trg.fpga_ts)?;
      }
      Event::BufferOverflow => {
        writeln!(self.file, "BUFFER_OVERFLOW")?;
      }
      Event::BusyAsserted(ts) => {
        writeln!(self.file, "BUSY_ASSERTED {}", ts)?;
      }
      Event::T0(ts) => {
        writeln!(self.file, "T0 {}", ts)?;
      }
      Event::SerdesLockLost => {
        writeln!(self.file, "SERDES_LOCK_LOST")?;
      }
      Event::SerdesLockEstablished => {
        writeln!(self.file, "SERDES_LOCK_ESTABLISHED")?;
      }
      Event::WeirdData(raw) => {
        writeln!(self.file, "WEIRD_DATA {:x}", raw)?;
      }
      Event::Unknown(tag) => {
        writeln!(self.file, "UNKNOWN_TAG {:#x}", tag)?;
      }
    }
    self.n_written += 1;
    Ok(())
  }

  pub fn flush(&mut self) -> io::Result<()> {
    self.file.flush()
  }

  pub fn mode(&self) -> OutputMode {
    self.mode
  }

  pub fn n_written(&self) -> usize {
    self.n_written
  }
}
