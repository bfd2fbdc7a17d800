pub mod registers;
pub mod memory;
pub mod control;
pub mod readout;
pub mod api;
pub mod calibration;
pub mod threads;

extern crate crossbeam_channel;

#[macro_use] extern crate log;
