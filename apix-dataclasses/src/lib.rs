//! Data structures and decoding for the ATLASPix readout
//!
//! Everything in this crate is independent of the actual
//! hardware - the raw 32bit protocol words can come from the
//! FPGA FIFO as well as from a file or a test vector. The
//! acquisition and calibration executables live in `apix-daq`.

pub mod constants;
pub mod errors;
pub mod events;
pub mod io;
pub mod matrix;
pub mod calibrations;
pub mod threading;
pub mod run;

#[macro_use] extern crate log;
