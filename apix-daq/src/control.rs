//! Register level operations on the readout, pulser,
//! counter and shift register windows
//!
//! For the address map see `registers.rs`

use std::thread;
use std::time::Duration;

use crate::memory::{RegisterError,
                    RegisterFile};
use crate::registers::*;

/// The FIFO holds at least one undecoded word
pub fn fifo_has_data(readout : &RegisterFile) -> Result<bool, RegisterError> {
  let value = readout.read_u32(FIFO_STATUS)?;
  Ok(value & 0x1 > 0)
}

/// Pop one word from the readout FIFO
pub fn read_fifo_word(readout : &RegisterFile) -> Result<u32, RegisterError> {
  readout.read_u32(FIFO_DATA)
}

/// Two consecutive half-words reassembled into one 64 bit
/// logical frame. Chip variants with the wide frame format
/// express their protocol in 32 bit halves.
pub fn read_fifo_frame64(readout : &RegisterFile) -> Result<u64, RegisterError> {
  let msw = readout.read_u32(FIFO_DATA)?;
  let lsw = readout.read_u32(FIFO_DATA)?;
  Ok(((msw as u64) << 32) | lsw as u64)
}

/// The deserializer locked onto the comma word
pub fn serdes_locked(readout : &RegisterFile) -> Result<bool, RegisterError> {
  let value = readout.read_u32(FIFO_STATUS)?;
  Ok((value >> 5) & 0x1 > 0)
}

/// Triggers accepted by the readout state machine
pub fn get_trigger_counter(readout : &RegisterFile) -> Result<u32, RegisterError> {
  readout.read_u32(TRG_CNT)
}

/// Strobe the FIFO reset bit
pub fn reset_fifo(readout : &RegisterFile) -> Result<(), RegisterError> {
  trace!("SET FIFO RESET");
  let config = readout.read_u32(FIFO_CONFIG)?;
  readout.write_u32(FIFO_CONFIG, (config & 0xFFFF_FFEF) | 0b10000)?;
  thread::sleep(Duration::from_micros(50));
  readout.write_u32(FIFO_CONFIG, config & 0xFFFF_FFEF)?;
  Ok(())
}

/// Mirror the chip ckdivend into the readout state machine
/// so both sides agree on the sampling clock
pub fn sync_ro_clockdiv(readout : &RegisterFile, ckdivend : u32) -> Result<(), RegisterError> {
  let ro = readout.read_u32(RO_CONFIG)?;
  readout.write_u32(RO_CONFIG, (ro & 0xFFFF_FF00) + (ckdivend & 0xFF))?;
  Ok(())
}


/// Put the pulse generator back into a defined state
pub fn reset_pulser(pulser : &RegisterFile) -> Result<(), RegisterError> {
  trace!("SET PULSER RESET");
  thread::sleep(Duration::from_micros(1));
  pulser.write_u32(PULSER_RST, 0x0)?;
  thread::sleep(Duration::from_micros(1));
  pulser.write_u32(PULSER_RST, 0x1)?;
  thread::sleep(Duration::from_micros(1));
  pulser.write_u32(PULSER_RST, 0x0)?;
  Ok(())
}

/// Arm the pulse generator with count and shape
pub fn setup_pulser(pulser  : &RegisterFile,
                    npulse  : u32,
                    n_up    : u32,
                    n_down  : u32) -> Result<(), RegisterError> {
  pulser.write_u32(PULSE_COUNT, npulse)?;
  pulser.write_u32(HIGH_CNT, n_up)?;
  pulser.write_u32(LOW_CNT, n_down)?;
  pulser.write_u32(PULSER_OUTPUT_ENABLE, 0xFFFFF)?;
  Ok(())
}

/// Duration of the armed burst in microseconds, plus a
/// fixed settle margin
pub fn pulse_width_micros(npulse : u32, n_up : u32, n_down : u32) -> u64 {
  let ticks = npulse as f64 * (n_up as f64 + n_down as f64);
  (ticks * (1.0 / INJECTION_CLOCK_HZ) / 1e-6).ceil() as u64 + 10
}

/// Fire the armed pulse train and block for its duration.
/// A partially delivered burst would corrupt calibration
/// data, so this is not a cancellation point.
pub fn fire_pulser(pulser : &RegisterFile, width_micros : u64) -> Result<(), RegisterError> {
  pulser.write_u32(INJ_FLAG, 0x1)?;
  thread::sleep(Duration::from_micros(width_micros));
  pulser.write_u32(INJ_FLAG, 0x0)?;
  Ok(())
}


/// Zero the hit counters and strobe the global reset line
pub fn reset_counters(counters : &RegisterFile) -> Result<(), RegisterError> {
  trace!("SET COUNTER RESET");
  counters.write_u32(GLOBAL_RESET, 0x0)?;
  thread::sleep(Duration::from_micros(10));
  counters.write_u32(GLOBAL_RESET, 0x1)?;
  thread::sleep(Duration::from_micros(10));
  counters.write_u32(GLOBAL_RESET, 0x0)?;
  thread::sleep(Duration::from_micros(10));
  counters.write_u32(CNT_RST, 0x0)?;
  thread::sleep(Duration::from_micros(1));
  counters.write_u32(CNT_RST, 0x1)?;
  thread::sleep(Duration::from_micros(1));
  counters.write_u32(CNT_RST, 0x0)?;
  Ok(())
}

/// Value of one of the four hit counters. The index is
/// mandatory - there is no implicit counter selection.
pub fn read_counter(counters : &RegisterFile, idx : usize) -> Result<u32, RegisterError> {
  let addr = match idx {
    0 => CNT_VALUE_0,
    1 => CNT_VALUE_1,
    2 => CNT_VALUE_2,
    3 => CNT_VALUE_3,
    _ => {
      error!("There is no counter with index {}!", idx);
      return Err(RegisterError::OutOfBounds);
    }
  };
  counters.read_u32(addr)
}


/// Clock a pre-encoded configuration image into the chip
///
/// The words get staged in the control window RAM with the
/// write-enable strobe discipline, then the config flag
/// shifts the image into the chip while the selected
/// outputs are enabled.
pub fn program_shift_register(control     : &RegisterFile,
                              words       : &[u32],
                              shift_limit : u32,
                              output_mask : u32) -> Result<(), RegisterError> {
  trace!("Programming {} shift register words", words.len());
  control.write_u32(CONFIG_FLAG, 0)?;
  control.write_u32(RAM_REG_LIMIT, (words.len() as u32).saturating_sub(1))?;
  control.write_u32(RAM_SHIFT_LIMIT, shift_limit)?;
  for (idx, word) in words.iter().enumerate() {
    control.write_u32(RAM_ADDRESS, idx as u32)?;
    control.write_u32(RAM_CONTENT, *word)?;
    thread::sleep(Duration::from_micros(10));
    control.write_u32(RAM_WRITE_ENABLE, 0x1)?;
    thread::sleep(Duration::from_micros(10));
    control.write_u32(RAM_WRITE_ENABLE, 0x0)?;
  }
  thread::sleep(Duration::from_micros(100));
  control.write_u32(SR_OUTPUT_ENABLE, output_mask)?;
  thread::sleep(Duration::from_micros(100));
  control.write_u32(CONFIG_FLAG, 0x1)?;
  Ok(())
}
