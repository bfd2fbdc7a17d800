//! Per run configuration

use std::error::Error;
use std::fmt;
use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize,
            Serialize};

use crate::constants::{GROUP_HEIGHT,
                       GROUP_WIDTH,
                       IDLE_POLL_LIMIT,
                       NOISE_CEILING};

/// Settings for data taking and calibration, loaded from a
/// JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaqConfig {
  /// matrix flavor (M1, M1Iso, M2)
  pub matrix           : String,
  /// output mode (binary, text, raw)
  pub output           : String,
  pub output_directory : String,
  /// the chip Gray-decodes its counters on-chip
  pub gray_disabled    : bool,
  /// injection fan-out granularity
  pub group_width      : u32,
  pub group_height     : u32,
  /// pulses per calibration burst
  pub npulses          : u32,
  /// pulse shape in injection clock ticks
  pub rise_ticks       : u32,
  pub fall_ticks       : u32,
  /// reference amplitude for trim tuning in volt
  pub tuning_amplitude : f64,
  /// per-step hit ceiling before a scan step aborts
  pub noise_ceiling    : u32,
  /// consecutive empty polls before a bounded read returns
  pub idle_poll_limit  : u32,
}

impl DaqConfig {

  pub fn new() -> Self {
    Self {
      matrix           : String::from("M1"),
      output           : String::from("binary"),
      output_directory : String::from("apixdata"),
      gray_disabled    : false,
      group_width      : GROUP_WIDTH,
      group_height     : GROUP_HEIGHT,
      npulses          : 100,
      rise_ticks       : 10000,
      fall_ticks       : 10000,
      tuning_amplitude : 0.3,
      noise_ceiling    : NOISE_CEILING,
      idle_poll_limit  : IDLE_POLL_LIMIT,
    }
  }

  pub fn from_file(filename : &Path) -> Result<DaqConfig, Box<dyn Error>> {
    let content = read_to_string(filename)?;
    let config : DaqConfig = serde_json::from_str(&content)?;
    Ok(config)
  }
}

impl fmt::Display for DaqConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr = serde_json::to_string(self).unwrap_or(
      String::from("ERROR: SerializationError!"));
    write!(f, "<DaqConfig: {}>", repr)
  }
}
