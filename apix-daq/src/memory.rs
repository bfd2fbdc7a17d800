//! Mapped access to the FPGA register windows
//!
//! Each window is mapped exactly once when the device is
//! opened and its size is validated then - accesses only
//! get range checked against the window, no address
//! arithmetic happens at the call sites.

extern crate memmap;

use std::error::Error;
use std::fmt;
use std::fs::File;

use memmap::MmapMut;

use apix_dataclasses::errors::ScanError;

/// The size of a 32bit unsigned int in byte
/// (all words in registers are u32)
pub const SIZEOF_U32 : usize = 4;

#[derive(Debug, Copy, Clone)]
pub enum RegisterError {
  MMapFail,
  OutOfBounds,
  Unknown,
}

impl fmt::Display for RegisterError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let etype : String;
    match self {
      RegisterError::MMapFail => {
        etype = String::from("MMapFail");
      },
      RegisterError::OutOfBounds => {
        etype = String::from("OutOfBounds");
      },
      RegisterError::Unknown => {
        etype = String::from("Unknown");
      }
    }
    write!(f, "<RegisterError: {}>", etype)
  }
}

impl Error for RegisterError {
}

impl From<RegisterError> for ScanError {
  fn from(_ : RegisterError) -> Self {
    ScanError::RegisterAccess
  }
}

/// One mapped register window with word granular, volatile
/// access
pub struct RegisterFile {
  map  : MmapMut,
  size : usize,
}

impl RegisterFile {

  /// Map `size` bytes at physical address `base` of `path`
  /// (typically /dev/mem)
  pub fn open(path : &str, base : u64, size : usize) -> Result<RegisterFile, RegisterError> {
    let file = match File::options()
      .read(true)
      .write(true)
      .open(path) {
      Ok(f)    => f,
      Err(err) => {
        error!("Failed to open {}! {:?}", path, err);
        return Err(RegisterError::MMapFail);
      }
    };
    let map = unsafe {
      memmap::MmapOptions::new()
        .offset(base)
        .len(size)
        .map_mut(&file)
    };
    match map {
      Ok(map)  => {
        Ok(RegisterFile {
          map  : map,
          size : size,
        })
      },
      Err(err) => {
        error!("Failed to mmap {} at {:#x}! {:?}", path, base, err);
        Err(RegisterError::MMapFail)
      }
    }
  }

  fn check(&self, addr : u32) -> Result<(), RegisterError> {
    if addr as usize + SIZEOF_U32 > self.size || addr as usize % SIZEOF_U32 != 0 {
      error!("Register address {:#x} outside of the {} byte window!", addr, self.size);
      return Err(RegisterError::OutOfBounds);
    }
    Ok(())
  }

  /// Volatile read of one 32 bit register
  pub fn read_u32(&self, addr : u32) -> Result<u32, RegisterError> {
    self.check(addr)?;
    let p = self.map.as_ptr() as *const u32;
    let value : u32;
    unsafe {
      value = std::ptr::read_volatile(p.add(addr as usize / SIZEOF_U32));
    }
    Ok(value)
  }

  /// Volatile write of one 32 bit register
  pub fn write_u32(&self, addr : u32, data : u32) -> Result<(), RegisterError> {
    trace!("Attempting to write {data:x} at addr {addr:x}");
    self.check(addr)?;
    let p = self.map.as_ptr() as *mut u32;
    unsafe {
      std::ptr::write_volatile(p.add(addr as usize / SIZEOF_U32), data);
    }
    Ok(())
  }
}
