//! Hit words and their decoding
//!
//! A hit word carries column, row and the two fine
//! timestamps of one pixel discriminator crossing. The
//! timestamps are Gray encoded on the chip unless the chip
//! itself is configured to decode them.

use std::fmt;

use crate::constants::{TS1_NBITS,
                       TS2_NBITS};

/// Undo the reflected Gray encoding of an `length` bit value
pub fn gray_decode(g : u32, length : u32) -> u32 {
  let mut value = g;
  let mut bit   = 1u32 << (length - 1);
  while bit > 1 {
    if value & bit != 0 {
      value ^= bit >> 1;
    }
    bit >>= 1;
  }
  value
}

/// A single decoded pixel hit
///
/// `fpga_ts` and `trigger_count` are not part of the hit
/// word. They get attached by the stream decoder and hold
/// the last *completed* trigger record at the time the hit
/// was read out.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PixelHit {
  pub col           : u32,
  pub row           : u32,
  pub ts1           : u32,
  pub ts2           : u32,
  pub tot           : u32,
  pub fpga_ts       : u64,
  pub trigger_count : u32,
}

impl PixelHit {
  pub fn new() -> Self {
    Self {
      col           : 0,
      row           : 0,
      ts1           : 0,
      ts2           : 0,
      tot           : 0,
      fpga_ts       : 0,
      trigger_count : 0,
    }
  }
}

impl fmt::Display for PixelHit {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<PixelHit: col {} row {} ts1 {} ts2 {} tot {} fpga_ts {} trg {}>",
           self.col, self.row, self.ts1, self.ts2, self.tot,
           self.fpga_ts, self.trigger_count)
  }
}

/// Decode a single hit word
///
/// Field layout: col = bits 29:25, row = bits 24:16,
/// ts1 = bits 15:6, ts2 = bits 5:0.
///
/// The time-over-threshold is the distance between ts2 and
/// ts1 rescaled to the ts2 clock. ts1 runs at half the base
/// clock, divided further by `ckdivend2 + 1`. Both counters
/// are 6 bit wide after scaling, so the difference has to
/// account for a single rollover.
///
/// This never fails - garbage input decodes to a garbage
/// hit and consumers filter on timing instead.
///
/// # Arguments
///
/// * ckdivend2     : value of the ckdivend2 field of the
///                   current chip configuration
/// * gray_disabled : the chip already decoded the Gray
///                   counters on its side
pub fn decode_hit(word : u32, ckdivend2 : u32, gray_disabled : bool) -> PixelHit {
  let mut hit = PixelHit::new();
  hit.col = (word >> 25) & 0x1F;
  hit.row = (word >> 16) & 0x1FF;
  hit.ts1 = (word >> 6)  & 0x3FF;
  hit.ts2 = word & 0x3F;

  if !gray_disabled {
    hit.ts1 = gray_decode(hit.ts1, TS1_NBITS);
    hit.ts2 = gray_decode(hit.ts2, TS2_NBITS);
  }

  let divider   = ckdivend2 + 1;
  let mut shift = 0u32;
  if divider & (divider - 1) == 0 {
    shift = divider.trailing_zeros();
  } else {
    warn!("ckdivend2 of {} yields a non power of 2 clock divider, TOT might be rubbish", ckdivend2);
  }

  let ts1_scaled = ((hit.ts1 << 1) >> shift) & 0x3F;
  if ts1_scaled < hit.ts2 {
    hit.tot = hit.ts2 - ts1_scaled;
  } else {
    // rollover
    hit.tot = 64 - ts1_scaled + hit.ts2;
  }
  hit.tot &= 0x3F;
  hit
}
