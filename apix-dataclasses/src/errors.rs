use std::error::Error;
use std::fmt;

/// Conditions which end a calibration step early
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ScanError {
  /// the per-step hit ceiling was exceeded, the step has to
  /// be redone after re-applying the mask and a chip reset
  NoiseRunaway { nhits : u32 },
  /// calibration can not run while the acquisition worker
  /// polls the same FIFO
  AcquisitionActive,
  /// a register access below the scan failed
  RegisterAccess,
}

impl fmt::Display for ScanError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : String;
    match self {
      ScanError::NoiseRunaway { nhits } => {
        etype = format!("NoiseRunaway ({} hits)", nhits);
      },
      ScanError::AcquisitionActive => {
        etype = String::from("AcquisitionActive");
      },
      ScanError::RegisterAccess => {
        etype = String::from("RegisterAccess");
      }
    }
    write!(f, "<ScanError: {}>", etype)
  }
}

impl Error for ScanError {
}


#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
  /// matrix flavor name not one of M1/M1Iso/M2
  UnknownFlavor(String),
  /// a named configuration field does not exist for this
  /// flavor
  UnknownRegister(String),
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : String;
    match self {
      ConfigError::UnknownFlavor(name) => {
        etype = format!("UnknownFlavor '{}'", name);
      },
      ConfigError::UnknownRegister(name) => {
        etype = format!("UnknownRegister '{}'", name);
      }
    }
    write!(f, "<ConfigError: {}>", etype)
  }
}

impl Error for ConfigError {
}
