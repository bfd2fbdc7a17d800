//! Calibration primitives
//!
//! The decision making parts of trim tuning and the scan
//! bookkeeping live here, decoupled from the hardware loop:
//! the tuner advances on plain hit counts and the scan
//! tables are filled from per-step counter maps. `apix-daq`
//! drives them against the real chip.

use std::collections::HashMap;
use std::fs::{self,
              File};
use std::io;
use std::io::Write;
use std::path::Path;

use crate::constants::{HOT_PIXEL_COUNT,
                       TRIM_ITERATION_CAP,
                       TRIM_MARGIN,
                       TRIM_MAX,
                       TRIM_START,
                       TRIM_TARGET};
use crate::events::PixelHit;

/// hit counts per pixel, scoped to one scan step
pub type CounterMap = HashMap<(u32, u32), u32>;
/// time-over-threshold accumulator per pixel
pub type TotMap     = HashMap<(u32, u32), f64>;

/// Number of hits addressed to exactly this pixel
pub fn count_pixel_hits(data : &[PixelHit], col : u32, row : u32) -> u32 {
  let mut count = 0u32;
  for hit in data {
    if hit.col == col && hit.row == row {
      count += 1;
    }
  }
  count
}

/// Accumulate the hits belonging to one injection group
/// into `counts`, returning the pixels which exceeded the
/// hot pixel count within this step
pub fn count_group_hits(data         : &[PixelHit],
                        mask_x       : u32,
                        mask_y       : u32,
                        group_width  : u32,
                        group_height : u32,
                        counts       : &mut CounterMap) -> Vec<(u32, u32)> {
  for hit in data {
    if (hit.col + mask_x) % group_width == 0 && (hit.row + mask_y) % group_height == 0 {
      *counts.entry((hit.col, hit.row)).or_insert(0) += 1;
    }
  }
  let mut hot = Vec::<(u32, u32)>::new();
  for (pixel, count) in counts.iter() {
    if *count > HOT_PIXEL_COUNT {
      hot.push(*pixel);
    }
  }
  hot
}

/// Accumulate the average time-over-threshold per pixel of
/// one injection group into `tots`
pub fn average_group_tot(data         : &[PixelHit],
                         mask_x       : u32,
                         mask_y       : u32,
                         group_width  : u32,
                         group_height : u32,
                         tots         : &mut TotMap) {
  let mut counts = CounterMap::new();
  for hit in data {
    if (hit.col + mask_x) % group_width == 0 && (hit.row + mask_y) % group_height == 0 {
      *counts.entry((hit.col, hit.row)).or_insert(0) += 1;
      *tots.entry((hit.col, hit.row)).or_insert(0.0) += hit.tot as f64;
    }
  }
  for (pixel, count) in counts.iter() {
    if let Some(tot) = tots.get_mut(pixel) {
      *tot /= *count as f64;
    }
  }
}

/// Verdict of one trim search step
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TrimStep {
  /// keep going with the updated trim
  Continue,
  /// hit fraction inside the target band
  Converged,
  /// trim pinned at 0 or 7, can not move further
  Saturated,
  /// way too many hits - mask this pixel and move on
  Masked,
  /// iteration cap reached without convergence
  CapReached,
}

/// Bounded per-pixel trim search
///
/// Starts mid range and walks the 3 bit trim one step per
/// pulse burst until the hit fraction lands inside the
/// target band. The search is linear in the trim range and
/// additionally capped, so it always terminates.
#[derive(Debug, Copy, Clone)]
pub struct TrimSearch {
  pub trim       : u8,
  pub iterations : u32,
  target         : f64,
  margin         : f64,
}

impl TrimSearch {

  pub fn new() -> Self {
    Self {
      trim       : TRIM_START,
      iterations : 0,
      target     : TRIM_TARGET,
      margin     : TRIM_MARGIN,
    }
  }

  pub fn with_band(target : f64, margin : f64) -> Self {
    let mut search = Self::new();
    search.target  = target;
    search.margin  = margin;
    search
  }

  /// Digest the hit count of one pulse burst at the current
  /// trim. On `Continue` the trim has already been moved for
  /// the next burst.
  pub fn advance(&mut self, nhits : u32, npulses : u32) -> TrimStep {
    self.iterations += 1;
    if nhits > 10 * npulses {
      return TrimStep::Masked;
    }
    let lo = npulses as f64 * (self.target - self.margin);
    let hi = npulses as f64 * (self.target + self.margin);
    let hits = nhits as f64;
    if hits >= lo && hits <= hi {
      return TrimStep::Converged;
    }
    if self.trim == 0 || self.trim == TRIM_MAX {
      return TrimStep::Saturated;
    }
    if hits < lo {
      self.trim -= 1;
    } else {
      self.trim += 1;
    }
    if self.iterations >= TRIM_ITERATION_CAP {
      return TrimStep::CapReached;
    }
    TrimStep::Continue
  }
}

/// Linearly spaced injection amplitudes
pub fn amplitude_steps(vmin : f64, vmax : f64, npoints : usize) -> Vec<f64> {
  let mut steps = Vec::<f64>::with_capacity(npoints);
  if npoints < 2 {
    warn!("A scan needs at least 2 amplitude points!");
    steps.push(vmin);
    return steps;
  }
  let dv = (vmax - vmin) / (npoints as f64 - 1.0);
  for n in 0..npoints {
    steps.push(vmin + n as f64 * dv);
  }
  steps
}

/// Hit counts per pixel and amplitude step, assembled group
/// by group over a full matrix sweep
pub struct SCurveTable {
  pub amplitudes : Vec<f64>,
  pub counts     : HashMap<(u32, u32), Vec<u32>>,
}

impl SCurveTable {

  pub fn new(vmin : f64, vmax : f64, npoints : usize) -> Self {
    Self {
      amplitudes : amplitude_steps(vmin, vmax, npoints),
      counts     : HashMap::new(),
    }
  }

  pub fn npoints(&self) -> usize {
    self.amplitudes.len()
  }

  /// Copy the per-step counts of one injection group into
  /// the table. Every pixel of the group gets its row, with
  /// zeros where it never fired.
  pub fn record_group(&mut self,
                      ncol         : u32,
                      nrow         : u32,
                      group_width  : u32,
                      group_height : u32,
                      mask_x       : u32,
                      mask_y       : u32,
                      step_counts  : &[CounterMap]) {
    for col in 0..ncol {
      if (col + mask_x) % group_width != 0 {
        continue;
      }
      for row in 0..nrow {
        if (row + mask_y) % group_height != 0 {
          continue;
        }
        let mut pixel_counts = Vec::<u32>::with_capacity(step_counts.len());
        for step in step_counts {
          pixel_counts.push(*step.get(&(col, row)).unwrap_or(&0));
        }
        self.counts.insert((col, row), pixel_counts);
      }
    }
  }

  /// Every pixel of the matrix has exactly one row
  pub fn is_complete(&self, ncol : u32, nrow : u32) -> bool {
    self.counts.len() == (ncol * nrow) as usize
  }

  /// One `col row count@v0 count@v1 ..` line per pixel
  pub fn write(&self, path : &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut file   = File::create(path)?;
    let mut pixels : Vec<&(u32, u32)> = self.counts.keys().collect();
    pixels.sort();
    for pixel in pixels {
      write!(file, "{} {}", pixel.0, pixel.1)?;
      for count in &self.counts[pixel] {
        write!(file, " {}", count)?;
      }
      writeln!(file)?;
    }
    info!("Wrote {} S-curve rows to {}", self.counts.len(), path.display());
    Ok(())
  }
}

/// Average time-over-threshold per pixel and amplitude step
pub struct TotTable {
  pub amplitudes : Vec<f64>,
  pub tots       : HashMap<(u32, u32), Vec<f64>>,
}

impl TotTable {

  pub fn new(vmin : f64, vmax : f64, npoints : usize) -> Self {
    Self {
      amplitudes : amplitude_steps(vmin, vmax, npoints),
      tots       : HashMap::new(),
    }
  }

  pub fn record_group(&mut self,
                      ncol         : u32,
                      nrow         : u32,
                      group_width  : u32,
                      group_height : u32,
                      mask_x       : u32,
                      mask_y       : u32,
                      step_tots    : &[TotMap]) {
    for col in 0..ncol {
      if (col + mask_x) % group_width != 0 {
        continue;
      }
      for row in 0..nrow {
        if (row + mask_y) % group_height != 0 {
          continue;
        }
        let mut pixel_tots = Vec::<f64>::with_capacity(step_tots.len());
        for step in step_tots {
          pixel_tots.push(*step.get(&(col, row)).unwrap_or(&0.0));
        }
        self.tots.insert((col, row), pixel_tots);
      }
    }
  }

  pub fn write(&self, path : &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut file   = File::create(path)?;
    let mut pixels : Vec<&(u32, u32)> = self.tots.keys().collect();
    pixels.sort();
    for pixel in pixels {
      write!(file, "{} {}", pixel.0, pixel.1)?;
      for tot in &self.tots[pixel] {
        write!(file, " {:.2}", tot)?;
      }
      writeln!(file)?;
    }
    info!("Wrote {} TOT rows to {}", self.tots.len(), path.display());
    Ok(())
  }
}

/// Final per-pixel tuning results, `col row trim count` per
/// line
pub fn write_tuning_results(path : &Path, results : &[(u32, u32, u8, u32)]) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  let mut file = File::create(path)?;
  writeln!(file, "X:\tY:\tTDAC:\tCOUNT:")?;
  for (col, row, trim, count) in results {
    writeln!(file, "{} {} {} {}", col, row, trim, count)?;
  }
  info!("Wrote {} tuning rows to {}", results.len(), path.display());
  Ok(())
}
