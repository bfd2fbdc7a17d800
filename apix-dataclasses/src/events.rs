//! Decoded records of the readout protocol

pub mod pixel_hit;
pub mod control;

pub use pixel_hit::{PixelHit,
                    decode_hit,
                    gray_decode};
pub use control::{Word,
                  ControlRecord,
                  TriggerRecord};
