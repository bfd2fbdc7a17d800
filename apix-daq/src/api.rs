//! Device level operations
//!
//! `ApixDevice` owns the four register windows, the matrix
//! configuration model and the acquisition supervisor. The
//! console and any remote control surface end up calling
//! the public operations here.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration,
                Instant};

use apix_dataclasses::calibrations::CounterMap;
use apix_dataclasses::errors::ScanError;
use apix_dataclasses::events::PixelHit;
use apix_dataclasses::events::control::TAG_WEIRD;
use apix_dataclasses::io::{HitWriter,
                           OutputMode,
                           WordStreamer};
use apix_dataclasses::matrix::{ApixMatrix,
                               MatrixFlavor};
use apix_dataclasses::run::DaqConfig;
use apix_dataclasses::threading::RunToken;

use crate::control::*;
use crate::memory::{RegisterError,
                    RegisterFile};
use crate::readout::{FifoSource,
                     acquire_hits};
use crate::registers::*;
use crate::threads::AcquisitionSupervisor;

/// Injection voltage supply on the carrier board
///
/// Regulator sequencing lives outside this crate - the
/// scans only need the injection amplitude and the
/// discriminator threshold set.
pub trait BiasSupply {
  fn set_injection_voltage(&mut self, volts : f64) -> Result<(), RegisterError>;
  fn set_threshold(&mut self, volts : f64) -> Result<(), RegisterError>;
}

/// Carrier without remotely controllable regulators
pub struct FixedBias;

impl BiasSupply for FixedBias {
  fn set_injection_voltage(&mut self, volts : f64) -> Result<(), RegisterError> {
    debug!("No remote regulators, injection voltage stays at {} V externally", volts);
    Ok(())
  }
  fn set_threshold(&mut self, volts : f64) -> Result<(), RegisterError> {
    debug!("No remote regulators, threshold stays at {} V externally", volts);
    Ok(())
  }
}

pub struct ApixDevice {
  pub readout           : Arc<RegisterFile>,
  pub pulser            : RegisterFile,
  pub counters          : RegisterFile,
  pub control           : RegisterFile,
  pub matrix            : ApixMatrix,
  pub config            : DaqConfig,
  /// drop words with the weird-data tag on the raw path
  pub filter_weird_data : bool,
  /// drop hits of masked pixels from inline acquisitions
  pub filter_hot_pixels : bool,
  bias                  : Box<dyn BiasSupply + Send>,
  supervisor            : AcquisitionSupervisor,
  pulse_width           : u64,
}

impl ApixDevice {

  /// Map the register windows and build the matrix model
  /// for the configured flavor
  pub fn open(config : DaqConfig) -> Result<ApixDevice, Box<dyn Error>> {
    let flavor   = MatrixFlavor::from_name(&config.matrix)?;
    let readout  = Arc::new(RegisterFile::open(MEM_DEVICE, READOUT_BASE, READOUT_MAP_SIZE)?);
    let pulser   = RegisterFile::open(MEM_DEVICE, PULSER_BASE, PULSER_MAP_SIZE)?;
    let counters = RegisterFile::open(MEM_DEVICE, COUNTER_BASE, COUNTER_MAP_SIZE)?;
    let control  = RegisterFile::open(MEM_DEVICE, CONTROL_BASE, CONTROL_MAP_SIZE)?;
    let mut matrix      = ApixMatrix::new(flavor);
    matrix.group_width  = config.group_width;
    matrix.group_height = config.group_height;
    Ok(ApixDevice {
      readout           : readout,
      pulser            : pulser,
      counters          : counters,
      control           : control,
      matrix            : matrix,
      config            : config,
      filter_weird_data : false,
      filter_hot_pixels : true,
      bias              : Box::new(FixedBias),
      supervisor        : AcquisitionSupervisor::new(),
      pulse_width       : 0,
    })
  }

  pub fn with_bias(&mut self, bias : Box<dyn BiasSupply + Send>) {
    self.bias = bias;
  }

  /// Encode the matrix state and clock it into the chip
  pub fn program_matrix(&self) -> Result<(), RegisterError> {
    let words = self.matrix.encode_shift_register();
    program_shift_register(&self.control,
                           &words,
                           self.matrix.shift_limit(),
                           self.matrix.sr_output_mask())?;
    // the readout state machine has to run on the same
    // clock divider as the chip
    sync_ro_clockdiv(&self.readout, self.matrix.ckdivend)?;
    Ok(())
  }

  /// Bring pulser, counters and chip configuration into a
  /// defined state
  pub fn configure(&mut self) -> Result<(), RegisterError> {
    info!("Configuring {}", self.matrix);
    reset_pulser(&self.pulser)?;
    reset_counters(&self.counters)?;
    thread::sleep(Duration::from_millis(1));
    self.program_matrix()?;
    Ok(())
  }

  /// Arm and fire a pulse train, blocking for its duration
  pub fn pulse(&mut self,
               npulse    : u32,
               n_up      : u32,
               n_down    : u32,
               amplitude : f64) -> Result<(), RegisterError> {
    reset_counters(&self.counters)?;
    self.bias.set_injection_voltage(amplitude)?;
    setup_pulser(&self.pulser, npulse, n_up, n_down)?;
    self.pulse_width = pulse_width_micros(npulse, n_up, n_down);
    fire_pulser(&self.pulser, self.pulse_width)?;
    thread::sleep(Duration::from_millis(2));
    Ok(())
  }

  /// Injection, hit-bus and analog buffer state of a single
  /// pixel
  pub fn set_pixel_injection(&mut self,
                             col    : u32,
                             row    : u32,
                             analog : bool,
                             hitbus : bool,
                             inject : bool) -> Result<(), RegisterError> {
    self.matrix.set_pixel_injection(col, row, analog, hitbus, inject);
    // the in-pixel RAM wants a second pass with the write
    // strobe low
    self.program_matrix()?;
    self.program_matrix()?;
    Ok(())
  }

  /// Enable or disable injection on one crosstalk-free
  /// pixel group. Enabling has to be paired with a disable
  /// after the scan to leave the chip deterministic.
  pub fn set_injection_group(&mut self,
                             mask_x  : u32,
                             mask_y  : u32,
                             enabled : bool) -> Result<(), RegisterError> {
    for col in 0..self.matrix.ncol {
      if (col + mask_x) % self.matrix.group_width == 0 {
        self.matrix.set_column_injection(col, enabled);
      }
    }
    for row in 0..self.matrix.nrow {
      if (row + mask_y) % self.matrix.group_height == 0 {
        self.matrix.set_row_injection(row, enabled);
      }
    }
    self.program_matrix()?;
    self.matrix.reset_write_dac();
    self.program_matrix()?;
    Ok(())
  }

  /// Turn off injection everywhere and re-apply the mask
  pub fn injection_off(&mut self) -> Result<(), RegisterError> {
    info!("Turning off injection on the whole matrix");
    self.matrix.clear_injection();
    self.matrix.reset_write_dac();
    self.program_matrix()?;
    self.reapply_mask()?;
    Ok(())
  }

  /// Write the trim of one pixel and reprogram
  pub fn write_one_tdac(&mut self, col : u32, row : u32, trim : u8) -> Result<(), RegisterError> {
    self.matrix.set_trim(col, row, trim);
    self.program_matrix()?;
    Ok(())
  }

  /// One trim value for the whole matrix
  pub fn write_uniform_tdac(&mut self, trim : u8) -> Result<(), RegisterError> {
    self.matrix.set_all_trim(trim);
    self.program_matrix()?;
    Ok(())
  }

  /// Set a named global configuration field and reprogram
  pub fn set_register(&mut self, name : &str, value : u32) -> Result<(), Box<dyn Error>> {
    self.matrix.set_register(name, value)?;
    self.program_matrix()?;
    Ok(())
  }

  /// Exclude a pixel from injection and analysis
  pub fn mask_pixel(&mut self, col : u32, row : u32) -> Result<(), RegisterError> {
    self.matrix.mask_pixel(col, row);
    self.program_matrix()?;
    Ok(())
  }

  /// Program the sticky mask bits again, e.g. after a noise
  /// runaway recovery
  pub fn reapply_mask(&mut self) -> Result<(), RegisterError> {
    info!("Re-applying the mask of {} pixels", self.matrix.masked_pixels().len());
    self.program_matrix()?;
    Ok(())
  }

  /// Bounded inline acquisition on the control thread with
  /// the configured noise ceiling
  pub fn acquire(&self, wall_ms : u64) -> Result<Vec<PixelHit>, ScanError> {
    self.acquire_with(wall_ms, self.config.noise_ceiling)
  }

  /// Bounded inline acquisition with an explicit hit
  /// ceiling
  pub fn acquire_with(&self, wall_ms : u64, ceiling : u32) -> Result<Vec<PixelHit>, ScanError> {
    if self.supervisor.is_running() {
      error!("Can not read inline while the acquisition worker is running!");
      return Err(ScanError::AcquisitionActive);
    }
    let mut source   = FifoSource { readout : &self.readout };
    let mut streamer = WordStreamer::new(self.matrix.ckdivend2, self.config.gray_disabled);
    let token        = RunToken::new();
    let mut hits = acquire_hits(&mut source,
                                &mut streamer,
                                &token,
                                Some(self.config.idle_poll_limit),
                                Duration::from_millis(wall_ms),
                                ceiling)?;
    if self.filter_hot_pixels {
      hits.retain(|hit| hit.col >= self.matrix.ncol
                     || hit.row >= self.matrix.nrow
                     || !self.matrix.is_masked(hit.col, hit.row));
    }
    Ok(hits)
  }

  /// Mask every pixel which fired more often than
  /// `threshold` within one second of quiet listening
  pub fn find_hot_pixels(&mut self, threshold : u32) -> Result<(), ScanError> {
    let data = self.acquire_with(1000, u32::MAX)?;
    let mut counts = CounterMap::new();
    for hit in &data {
      *counts.entry((hit.col, hit.row)).or_insert(0) += 1;
    }
    for (pixel, count) in counts.iter() {
      if *count > threshold {
        warn!("Masking hot pixel ({},{}) with {} hits", pixel.0, pixel.1, count);
        self.mask_pixel(pixel.0, pixel.1)?;
      }
    }
    Ok(())
  }

  /// One manually polled word (raw output mode)
  pub fn read_raw_word(&self) -> Result<Option<u32>, RegisterError> {
    let word = read_fifo_word(&self.readout)?;
    if word == 0 {
      return Ok(None);
    }
    if self.filter_weird_data && ((word >> 24) & 0xFF) as u8 == TAG_WEIRD {
      return Ok(None);
    }
    Ok(Some(word))
  }

  /// Full chip reset: hold the readout, serializer and
  /// Aurora blocks in reset with the input stages off, then
  /// bring everything back and re-lock the deserializer
  pub fn reset(&mut self) -> Result<(), RegisterError> {
    let threshold = self.matrix.thpix;
    self.bias.set_threshold(1.8)?;

    self.matrix.ro_res_n     = 0;
    self.matrix.ser_res_n    = 0;
    self.matrix.aur_res_n    = 0;
    self.matrix.global_reset = 1;
    let vnpix  = self.matrix.vnpix;
    let vncomp = self.matrix.vncomp_pix;
    self.matrix.vnpix      = 0;
    self.matrix.vncomp_pix = 0;
    self.program_matrix()?;

    thread::sleep(Duration::from_millis(1));

    self.matrix.ro_res_n     = 1;
    self.matrix.ser_res_n    = 1;
    self.matrix.aur_res_n    = 1;
    self.matrix.global_reset = 0;
    self.matrix.vnpix        = vnpix;
    self.matrix.vncomp_pix   = vncomp;
    self.program_matrix()?;

    self.bias.set_threshold(threshold)?;

    // lock onto the comma word again
    self.matrix.ro_res_n = 0;
    self.program_matrix()?;
    reset_fifo(&self.readout)?;
    thread::sleep(Duration::from_micros(100));
    self.matrix.ro_res_n = 1;
    self.program_matrix()?;
    Ok(())
  }

  pub fn reset_fifo(&self) -> Result<(), RegisterError> {
    reset_fifo(&self.readout)
  }

  pub fn is_locked(&self) -> bool {
    match serdes_locked(&self.readout) {
      Err(err) => {
        error!("Unable to query the deserializer lock! {err}");
        false
      }
      Ok(locked) => locked,
    }
  }

  pub fn trigger_count(&self) -> Result<u32, RegisterError> {
    get_trigger_counter(&self.readout)
  }

  pub fn log_trigger_counts(&self) {
    match self.trigger_count() {
      Err(err) => error!("Unable to read the trigger counter! {err}"),
      Ok(cnt)  => info!("Triggers accepted by the state machine       {}", cnt),
    }
    match read_counter(&self.counters, 2) {
      Err(err) => error!("Unable to read counter 2! {err}"),
      Ok(cnt)  => info!("Triggers accepted by the state machine (ext) {}", cnt),
    }
    match read_counter(&self.counters, 3) {
      Err(err) => error!("Unable to read counter 3! {err}"),
      Ok(cnt)  => info!("Triggers received                            {}", cnt),
    }
  }

  pub fn daq_running(&self) -> bool {
    self.supervisor.is_running()
  }

  /// Start continuous background acquisition. Warns and
  /// does nothing when a run is already active.
  pub fn daq_start(&mut self) {
    if self.supervisor.is_running() {
      warn!("Data acquisition is already running!");
      return;
    }
    let mode = OutputMode::from_name(&self.config.output);
    if mode == OutputMode::Raw {
      warn!("Raw output mode has no acquisition worker!");
      return;
    }
    match reset_fifo(&self.readout) {
      Err(err) => error!("Unable to reset the FIFO! {err}"),
      Ok(_)    => ()
    }
    match reset_counters(&self.counters) {
      Err(err) => error!("Unable to reset the counters! {err}"),
      Ok(_)    => ()
    }
    let writer = match HitWriter::new(Path::new(&self.config.output_directory), mode) {
      Err(err) => {
        error!("Unable to open the run file! {err}");
        return;
      }
      Ok(writer) => writer,
    };
    self.supervisor.start(Arc::clone(&self.readout),
                          mode,
                          writer,
                          self.matrix.ckdivend2,
                          self.config.gray_disabled);
  }

  /// Stop the background acquisition and block until the
  /// worker has exited - afterwards the registers are free
  /// for the control thread again
  pub fn daq_stop(&mut self) {
    match self.supervisor.stop() {
      None          => (),
      Some(records) => {
        info!("The run processed {} records", records);
        match self.trigger_count() {
          Err(err) => error!("Unable to read the trigger counter! {err}"),
          Ok(cnt)  => info!("Trigger count at end of run : {}", cnt),
        }
      }
    }
  }

  /// Take noise data (no injection) for a fixed duration
  pub fn noise_run(&mut self, nseconds : u64) {
    let start = Instant::now();
    self.daq_start();
    while start.elapsed().as_secs() < nseconds {
      thread::sleep(Duration::from_millis(100));
    }
    self.daq_stop();
  }
}
