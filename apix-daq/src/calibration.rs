//! Calibration routines: trim tuning, S-curve sweeps and
//! TOT measurement
//!
//! All of these run on the control thread with their own
//! bounded read loop and refuse to start while the
//! acquisition worker is alive - the FIFO has exactly one
//! reader at a time.

use std::path::Path;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar,
                ProgressStyle};

use apix_dataclasses::calibrations::{CounterMap,
                                     SCurveTable,
                                     TotMap,
                                     TotTable,
                                     TrimSearch,
                                     TrimStep,
                                     amplitude_steps,
                                     average_group_tot,
                                     count_group_hits,
                                     count_pixel_hits,
                                     write_tuning_results};
use apix_dataclasses::constants::TRIM_MAX;
use apix_dataclasses::errors::ScanError;

use crate::api::ApixDevice;

/// wall clock per bounded read while tuning a pixel
const TUNING_WINDOW_MS : u64 = 300;
/// wall clock per bounded read within a group scan step
const SCAN_WINDOW_MS   : u64 = 200;
/// wall clock per bounded read for a single pixel curve
const PIXEL_WINDOW_MS  : u64 = 30;

const BAR_TEMPLATE : &str = "[{elapsed_precise}] {msg} {spinner} {bar:60.blue/grey} {pos:>7}/{len:7}";

fn progress_bar(len : u64, label : &str) -> ProgressBar {
  let bar = ProgressBar::new(len);
  let sty = ProgressStyle::with_template(BAR_TEMPLATE).unwrap();
  bar.set_style(sty);
  bar.set_message(String::from(label));
  bar
}

/// Adaptively tune the trim of every pixel towards the
/// target hit fraction at the reference amplitude
///
/// Per pixel: enable injection on exactly this pixel, fire
/// a burst, count the hits addressed to it and walk the
/// trim by one. Noisy pixels get masked, the search is
/// capped. Returns `(col, row, trim, count)` per pixel and
/// writes them to verif.txt.
pub fn tune(dev       : &mut ApixDevice,
            amplitude : f64,
            npulses   : u32) -> Result<Vec<(u32, u32, u8, u32)>, ScanError> {
  if dev.daq_running() {
    error!("Can not tune while data acquisition is running!");
    return Err(ScanError::AcquisitionActive);
  }
  let rise = dev.config.rise_ticks;
  let fall = dev.config.fall_ticks;
  info!("Tuning all pixels at a reference amplitude of {} V", amplitude);
  let mut results = Vec::<(u32, u32, u8, u32)>::new();
  let bar = progress_bar((dev.matrix.ncol * dev.matrix.nrow) as u64, "PIXELS");
  for col in 0..dev.matrix.ncol {
    for row in 0..dev.matrix.nrow {
      bar.inc(1);
      let mut search     = TrimSearch::new();
      let mut last_count = 0u32;
      dev.write_one_tdac(col, row, search.trim)?;
      loop {
        dev.set_pixel_injection(col, row, false, false, true)?;
        dev.pulse(npulses, rise, fall, amplitude)?;
        thread::sleep(Duration::from_millis(1));
        let data = match dev.acquire(TUNING_WINDOW_MS) {
          Err(ScanError::NoiseRunaway { nhits }) => {
            warn!("Stopping this pixel because of noise ({} hits), re-applying the mask", nhits);
            dev.reapply_mask()?;
            dev.reset()?;
            thread::sleep(Duration::from_secs(1));
            break;
          }
          Err(err) => {
            return Err(err);
          }
          Ok(data) => data,
        };
        let nhits  = count_pixel_hits(&data, col, row);
        last_count = nhits;
        dev.reset_fifo()?;
        debug!("tdac: {} cnt: {}", search.trim, nhits);
        match search.advance(nhits, npulses) {
          TrimStep::Continue => {
            dev.write_one_tdac(col, row, search.trim)?;
          }
          TrimStep::Masked => {
            warn!("Pixel ({},{}) is way too noisy, masking it", col, row);
            dev.mask_pixel(col, row)?;
            break;
          }
          TrimStep::Converged | TrimStep::Saturated | TrimStep::CapReached => {
            break;
          }
        }
      }
      dev.write_one_tdac(col, row, search.trim)?;
      dev.set_pixel_injection(col, row, false, false, false)?;
      println!("{}", format!("pixel ({},{}) tdac: {} cnt: {}",
                             col, row, search.trim, last_count).green());
      results.push((col, row, search.trim, last_count));
    }
  }
  bar.finish();
  let path = Path::new(&dev.config.output_directory).join("verif.txt");
  match write_tuning_results(&path, &results) {
    Err(err) => error!("Unable to write the tuning results! {err}"),
    Ok(_)    => ()
  }
  Ok(results)
}

/// Sweep the injection amplitude over every pixel group and
/// record per-pixel hit counts
///
/// The group loop partitions the matrix - over all
/// `(mask_x, mask_y)` pairs every pixel is scanned exactly
/// once. Each group gets enabled, reset, swept and disabled
/// again.
pub fn s_curves(dev     : &mut ApixDevice,
                vmin    : f64,
                vmax    : f64,
                npulses : u32,
                npoints : usize) -> Result<SCurveTable, ScanError> {
  if dev.daq_running() {
    error!("Can not scan while data acquisition is running!");
    return Err(ScanError::AcquisitionActive);
  }
  let rise = dev.config.rise_ticks;
  let fall = dev.config.fall_ticks;
  let ncol = dev.matrix.ncol;
  let nrow = dev.matrix.nrow;
  let gw   = dev.matrix.group_width;
  let gh   = dev.matrix.group_height;
  info!("S-curve sweep with {} amplitude steps from {} V to {} V", npoints, vmin, vmax);
  let mut table = SCurveTable::new(vmin, vmax, npoints);
  let bar = progress_bar((gw * gh) as u64, "GROUPS");
  for mask_x in 0..gw {
    for mask_y in 0..gh {
      bar.inc(1);
      dev.set_injection_group(mask_x, mask_y, true)?;
      dev.reset()?;
      thread::sleep(Duration::from_millis(1));
      let mut step_counts = vec![CounterMap::new(); npoints];
      for step in 0..table.npoints() {
        let vinj = table.amplitudes[step];
        debug!("pulse height : {}", vinj);
        dev.pulse(npulses, rise, fall, vinj)?;
        thread::sleep(Duration::from_millis(10));
        match dev.acquire(SCAN_WINDOW_MS) {
          Err(ScanError::NoiseRunaway { nhits }) => {
            warn!("Aborting this step because of noise ({} hits), re-applying the mask", nhits);
            dev.reapply_mask()?;
            dev.reset()?;
            thread::sleep(Duration::from_secs(1));
          }
          Err(err) => {
            return Err(err);
          }
          Ok(data) => {
            let hot = count_group_hits(&data, mask_x, mask_y, gw, gh, &mut step_counts[step]);
            for pixel in hot {
              debug!("Pixel ({},{}) ran hot in this step", pixel.0, pixel.1);
            }
          }
        }
        dev.reset_fifo()?;
      }
      table.record_group(ncol, nrow, gw, gh, mask_x, mask_y, &step_counts);
      dev.set_injection_group(mask_x, mask_y, false)?;
    }
  }
  bar.finish();
  Ok(table)
}

/// Efficiency curve of a single pixel
pub fn s_curve_pixel(dev     : &mut ApixDevice,
                     col     : u32,
                     row     : u32,
                     vmin    : f64,
                     vmax    : f64,
                     npulses : u32,
                     npoints : usize) -> Result<Vec<u32>, ScanError> {
  if dev.daq_running() {
    error!("Can not scan while data acquisition is running!");
    return Err(ScanError::AcquisitionActive);
  }
  let rise = dev.config.rise_ticks;
  let fall = dev.config.fall_ticks;
  let amplitudes = amplitude_steps(vmin, vmax, npoints);
  let mut counts = Vec::<u32>::with_capacity(npoints);
  dev.set_pixel_injection(col, row, false, false, true)?;
  for vinj in &amplitudes {
    dev.pulse(npulses, rise, fall, *vinj)?;
    thread::sleep(Duration::from_millis(1));
    let data = dev.acquire(PIXEL_WINDOW_MS)?;
    let count = count_pixel_hits(&data, col, row);
    info!("{} {}", vinj, count);
    dev.reset_fifo()?;
    counts.push(count);
  }
  dev.set_pixel_injection(col, row, false, false, false)?;
  Ok(counts)
}

/// Like the S-curve sweep, but record the average
/// time-over-threshold per pixel instead of the hit count
pub fn measure_tot(dev     : &mut ApixDevice,
                   vmin    : f64,
                   vmax    : f64,
                   npulses : u32,
                   npoints : usize) -> Result<TotTable, ScanError> {
  if dev.daq_running() {
    error!("Can not scan while data acquisition is running!");
    return Err(ScanError::AcquisitionActive);
  }
  let rise = dev.config.rise_ticks;
  let fall = dev.config.fall_ticks;
  let ncol = dev.matrix.ncol;
  let nrow = dev.matrix.nrow;
  let gw   = dev.matrix.group_width;
  let gh   = dev.matrix.group_height;
  info!("TOT sweep with {} amplitude steps from {} V to {} V", npoints, vmin, vmax);
  let mut table = TotTable::new(vmin, vmax, npoints);
  let bar = progress_bar((gw * gh) as u64, "GROUPS");
  for mask_x in 0..gw {
    for mask_y in 0..gh {
      bar.inc(1);
      dev.set_injection_group(mask_x, mask_y, true)?;
      let mut step_tots = vec![TotMap::new(); npoints];
      for step in 0..table.amplitudes.len() {
        let vinj = table.amplitudes[step];
        debug!("pulse height : {}", vinj);
        dev.pulse(npulses, rise, fall, vinj)?;
        match dev.acquire(SCAN_WINDOW_MS) {
          Err(ScanError::NoiseRunaway { nhits }) => {
            warn!("Aborting this step because of noise ({} hits), re-applying the mask", nhits);
            dev.reapply_mask()?;
            dev.reset()?;
            thread::sleep(Duration::from_secs(1));
          }
          Err(err) => {
            return Err(err);
          }
          Ok(data) => {
            average_group_tot(&data, mask_x, mask_y, gw, gh, &mut step_tots[step]);
          }
        }
      }
      table.record_group(ncol, nrow, gw, gh, mask_x, mask_y, &step_tots);
      dev.set_injection_group(mask_x, mask_y, false)?;
    }
  }
  bar.finish();
  Ok(table)
}

/// Full S-curve sweep for every trim value at the given
/// trim DAC bias - the raw material for picking a tuning
/// working point
pub fn tdac_scan(dev     : &mut ApixDevice,
                 vndac   : u32,
                 vmin    : f64,
                 vmax    : f64,
                 npulses : u32,
                 npoints : usize) -> Result<(), ScanError> {
  dev.matrix.vndac_pix = vndac;
  dev.program_matrix()?;
  for trim in 0..=TRIM_MAX {
    info!("TDAC scan at trim {}", trim);
    dev.write_uniform_tdac(trim)?;
    let table = s_curves(dev, vmin, vmax, npulses, npoints)?;
    let fname = format!("SCURVE_VNDAC{}_TDAC{}.txt", vndac, trim);
    let path  = Path::new(&dev.config.output_directory).join(fname);
    match table.write(&path) {
      Err(err) => error!("Unable to write the S-curve table! {err}"),
      Ok(_)    => ()
    }
  }
  Ok(())
}
